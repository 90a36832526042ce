//! Services module - filesystem logic for organizing the watched folder.
//!
//! These services have no dependency on engine state or any presentation layer,
//! so each can be tested against a temporary directory on its own.
//!
//! # Components
//!
//! - [`classifier`]: maps a file name's extension to the first enabled matching rule
//! - [`mover`]: [`CollisionSafeMover`] creates the rule folder, picks a free name
//!   (`name_1.ext`, `name_2.ext`, ...) and renames the file into place
//! - [`scanner`]: one non-recursive pass over the watched folder, producing a [`ScanReport`]
//! - [`watcher`]: [`FolderWatcher`] wraps a `notify` subscription and debounces bursts of events
//! - [`autostart`]: the [`AutostartRegistrar`] seam for run-at-login registration
//!
//! # Flow
//!
//! ```text
//! FolderWatcher tick ──► debounce ──► scan_directory
//!                                        ├─► classify_file
//!                                        └─► CollisionSafeMover::move_file ──► FileMoveRecord
//! ```

pub mod autostart;
pub mod classifier;
pub mod mover;
pub mod scanner;
pub mod watcher;

pub use autostart::{AutostartError, AutostartRegistrar, DisabledAutostart, XdgAutostart};
pub use classifier::{classify, classify_file, extension_of};
pub use mover::{CollisionSafeMover, MoveError, unique_destination};
pub use scanner::{ScanReport, list_candidates, scan_directory};
pub use watcher::{FolderWatcher, WatchError, WatchStart};
