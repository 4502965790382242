mod actor;
mod types;

pub use actor::{Actor, ActorId, Role};
pub use types::*;
