//! Gradient-boosted decision tree classifier
//!
//! Models serialize to canonical JSON (sorted keys) so a trained ensemble
//! has a stable blake3 content hash:
//!
//! ```json
//! {
//!   "base_score": -0.47,
//!   "best_iteration": 12,
//!   "feature_names": ["Age", "Fare"],
//!   "trees": [
//!     {
//!       "nodes": [
//!         {"feature_idx":0,"id":0,"leaf":null,"left":1,"right":2,"threshold":12.5},
//!         {"feature_idx":-1,"id":1,"leaf":0.8,"left":-1,"right":-1,"threshold":0.0},
//!         {"feature_idx":-1,"id":2,"leaf":-0.3,"left":-1,"right":-1,"threshold":0.0}
//!       ],
//!       "weight": 0.1
//!     }
//!   ],
//!   "version": 1
//! }
//! ```

pub mod model;
pub mod tree;

pub use model::{logit, sigmoid, BoosterModel, MODEL_FORMAT_VERSION};
pub use tree::{Node, Tree};
