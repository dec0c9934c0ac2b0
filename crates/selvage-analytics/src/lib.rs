//! Analytics over the order store: market-basket associations, RFM customer
//! segmentation, and the weekly-specials scorer.
//!
//! Everything here is a pure function over read-model rows; the store is
//! queried by the caller and never touched from this crate.

pub mod basket;
pub mod error;
pub mod rfm;
pub mod score;

pub use basket::{Association, LiftIndex, associations};
pub use error::{Error, Result};
pub use rfm::{CustomerRfm, segments};
pub use score::{Recommendation, ScoreInputs, ScoredProduct, recommend};
