//! Release name to branch name mapping.

use fleet_core::FleetError;

/// Release whose branch is plain `master`.
pub const DEVELOPMENT: &str = "development";

/// Build every release has and that has no parent.
pub const MASTER_BUILD: &str = "master";

/// Namespaces whose children are releases in their own right.
pub const NAMESPACES: [&str; 2] = ["feature", "local"];

/// Git branch that holds `release`.
///
/// | release       | branch                |
/// |---------------|-----------------------|
/// | `development` | `master`              |
/// | `X`           | `release/X/master`    |
/// | `feature/X`   | `feature/X/master`    |
/// | `local/X`     | `local/X/master`      |
pub fn release_branch(release: &str) -> Result<String, FleetError> {
    if release == DEVELOPMENT {
        return Ok("master".to_string());
    }
    let parts: Vec<&str> = release.split('/').collect();
    match parts.as_slice() {
        [name] if !name.is_empty() => Ok(format!("release/{name}/master")),
        [ns, name] if NAMESPACES.contains(ns) && !name.is_empty() => {
            Ok(format!("{ns}/{name}/master"))
        }
        _ => Err(FleetError::validation(
            "release name",
            format!("'{release}' is not a valid release name"),
        )),
    }
}

/// Split `release/build` at the last slash.
pub fn split_build_name(full: &str) -> Option<(&str, &str)> {
    full.rsplit_once('/')
        .filter(|(release, build)| !release.is_empty() && !build.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("development", "master")]
    #[case("foo", "release/foo/master")]
    #[case("feature/bar", "feature/bar/master")]
    #[case("local/mine", "local/mine/master")]
    fn valid_release_names(#[case] release: &str, #[case] branch: &str) {
        assert_eq!(release_branch(release).unwrap(), branch);
    }

    #[rstest]
    #[case("weird/shape/x")]
    #[case("other/bar")]
    #[case("")]
    #[case("feature/")]
    fn invalid_release_names(#[case] release: &str) {
        assert!(matches!(
            release_branch(release),
            Err(FleetError::Validation { .. })
        ));
    }

    #[test]
    fn build_names_split_at_last_slash() {
        assert_eq!(split_build_name("feature/x/master"), Some(("feature/x", "master")));
        assert_eq!(split_build_name("grizzly/openstack"), Some(("grizzly", "openstack")));
        assert_eq!(split_build_name("master"), None);
    }
}
