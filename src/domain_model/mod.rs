mod deadline;
mod subject;
mod token;

pub use deadline::*;
pub use subject::*;
pub use token::*;
