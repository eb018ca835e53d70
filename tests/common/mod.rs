//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::TestLibrary;
//!
//! #[test]
//! fn test_create_album() {
//!     let library = TestLibrary::open();
//!     let album = library.album("Foo");
//!     assert_eq!(library.store.read_album(&album.id).unwrap(), album);
//! }
//! ```

mod constants;
mod fixtures;

// Public API - this is what tests import
pub use constants::*;
pub use fixtures::TestLibrary;
