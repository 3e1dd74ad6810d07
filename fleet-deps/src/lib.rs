//! Module metadata loading and dependency ordering for fleet.
//!
//! [`resolve`] is a pure function from [`ModuleDeclaration`]s to a
//! deterministic [`Resolution`]; [`load_declarations`] reads the declarations
//! out of `module.yml` files.

pub mod declaration;
pub mod error;
pub mod resolver;

pub use declaration::{load_declaration_at, load_declarations, ModuleDeclaration, MODULE_FILE};
pub use error::ResolveError;
pub use resolver::{resolve, Resolution};
