pub mod meta;
pub mod traits;

pub use meta::*;
pub use traits::*;

use convert_case::{Case, Casing};

/// Field that stores the concrete type of documents sharing a collection.
pub const DISCRIMINATOR_FIELD: &str = "_type";

/// `News::Paper` -> `paper`
pub(crate) fn demodulize_snake(name: &str) -> String {
    let base = name.rsplit("::").next().unwrap_or(name);
    base.to_case(Case::Snake)
}

/// Foreign key name pointing at documents of the model called `name`.
pub fn foreign_key_for(name: &str) -> String {
    format!("{}_id", demodulize_snake(name))
}
