//! Document diffing and update-operator handling.
//!
//! - [`diff`]: [`get_updates`] (old → new as operators) and
//!   [`deep_copy_changes`] (in-place copy that keeps `$$` keys).
//! - [`modifier`]: [`Modifier`], [`apply_modifier`] and [`split_pulls`].

pub mod diff;
pub mod modifier;

pub use diff::{deep_copy_changes, get_updates, DiffMode};
pub use modifier::{apply_modifier, set_path, split_pulls, unset_path, Modifier};
