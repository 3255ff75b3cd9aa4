pub mod entities;
pub mod matching;

pub use entities::{
    Activity, ActivityId, AuditLogEntry, Company, CompanyData, CompanyId, Contact, ContactData,
    ContactId, Conversation, ConversationId, Deal, DealId, EntityKind, RelatedType,
};
pub use matching::{
    CompanyMergeRequest, ContactMergeRequest, DuplicateGroup, DuplicateMatch, MatchReason,
    MatchResult, MergeRequest, sort_by_confidence_desc,
};
