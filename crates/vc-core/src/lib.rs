pub mod error;
pub mod types;
pub mod value;

pub use error::VarCommandError;
pub use types::*;
pub use value::*;
