//! CLI commands implementation

pub mod init;
pub mod mappings;
pub mod report;
pub mod sources;
pub mod status;
pub mod sync;

pub use init::*;
pub use mappings::*;
pub use report::*;
pub use sources::*;
pub use status::*;
pub use sync::*;
