pub mod duplicate_groups;

pub use duplicate_groups::{
    find_all_company_duplicates, find_all_contact_duplicates, find_all_duplicates,
    group_duplicates, ClusterRequest,
};
