pub mod executor;

pub use executor::{merge, merge_companies, merge_contacts, validate_merge_ids, MergeTarget};
