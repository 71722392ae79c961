//! # System Interaction Layer
//!
//! Boundary between the deployment core and the operating system.
//!
//! ## Modules
//!
//! - **`executor`**: Runs commands locally or over SSH, with deadlines, dry-run refusal and
//!   output capture. The core only sees the `RemoteExecutor` trait.
//! - **`heartbeat`**: Progress dots printed while long remote commands run.
//! - **`interrupt`**: Ctrl+C handling, with sections that defer the interrupt until a
//!   configuration write has finished.
//! - **`lock`**: Advisory lock that keeps two installers off the same install root.

pub mod executor;
pub mod heartbeat;
pub mod interrupt;
pub mod lock;
