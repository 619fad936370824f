mod brewery;

pub use brewery::{BreweryRecord, KNOWN_FIELDS};
