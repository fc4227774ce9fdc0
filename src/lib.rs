#![warn(clippy::all, clippy::pedantic)]

// disable some style lints
#![allow(clippy::needless_return, clippy::must_use_candidate, clippy::comparison_chain)]
#![allow(clippy::redundant_field_names, clippy::redundant_closure_for_method_calls)]
#![allow(clippy::unreadable_literal, clippy::option_if_let_else, clippy::range_plus_one)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::module_name_repetitions)]

#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap, clippy::cast_lossless, clippy::cast_sign_loss)]
#![allow(clippy::default_trait_access)]

// Tests lints
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod types;
pub use types::Vector3D;

mod errors;
pub use self::errors::Error;

mod periodic;
pub use self::periodic::PeriodicBox;

mod grid;
pub use self::grid::CellGrid;

mod search;
pub use self::search::{NearestNeighbors, NearestNeighborsParameters};
pub use self::search::{Neighbor, NeighborTable};
pub use self::search::{SENTINEL_DISTANCE2, SENTINEL_INDEX, SENTINEL_VECTOR};
