//! Artifact generation for compiled contract tables
//!
//! Every compile pass produces two files in the destination directory:
//!
//! ```ignore
//! build/contracts/
//!   compiled.json   full table: interface, bytecode, deployedAt
//!   compiled.js     frontend module: interfaces, allow-listed bytecode and
//!                   a linker for the network detected at runtime
//! ```

mod frontend;
mod writer;

pub use frontend::{redact, render_frontend, FrontendContext, FrontendContract};
pub use writer::{load_backend, ArtifactWriter, SavedArtifacts};

/// Backend artifact file name
pub const BACKEND_FILE: &str = "compiled.json";

/// Frontend artifact file name
pub const FRONTEND_FILE: &str = "compiled.js";
