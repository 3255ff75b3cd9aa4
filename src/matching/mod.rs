pub mod candidates;
pub mod email;
pub mod name;
pub mod phone;
pub mod signals;
pub mod url;

pub use candidates::{
    find_company_duplicates, find_contact_duplicates, rank_candidates, CompanyProbe,
    ContactProbe, FindDuplicatesRequest,
};
pub use signals::{evaluate, MatchProfile, Matchable};
