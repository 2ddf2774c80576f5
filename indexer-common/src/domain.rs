mod block;
mod network_id;

pub use block::*;
pub use network_id::*;
