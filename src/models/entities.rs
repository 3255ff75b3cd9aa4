// src/models/entities.rs

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

//------------------------------------------------------------------------------
// IDENTIFIER TYPES
//------------------------------------------------------------------------------
// Newtype ids keep contact, company and dependent-record keys from being mixed up.

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

define_id!(
    /// Identifier of a contact record
    ContactId
);
define_id!(
    /// Identifier of a company record
    CompanyId
);
define_id!(ActivityId);
define_id!(ConversationId);
define_id!(DealId);

/// The two record kinds the engine deduplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Contact,
    Company,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Contact => "contact",
            EntityKind::Company => "company",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//------------------------------------------------------------------------------
// MATCHABLE ENTITIES
//------------------------------------------------------------------------------

/// A person record. `last_name` is the only required field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    #[serde(default)]
    pub first_name: Option<String>,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company_id: Option<CompanyId>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Contact {
    pub fn new(id: impl Into<ContactId>, last_name: impl Into<String>) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: id.into(),
            first_name: None,
            last_name: last_name.into(),
            email: None,
            phone: None,
            company_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_company(mut self, company_id: impl Into<CompanyId>) -> Self {
        self.company_id = Some(company_id.into());
        self
    }

    /// Replaces every mutable field with the caller-curated values.
    pub fn apply(&mut self, data: &ContactData, now: NaiveDateTime) {
        self.first_name = data.first_name.clone();
        self.last_name = data.last_name.clone();
        self.email = data.email.clone();
        self.phone = data.phone.clone();
        self.company_id = data.company_id.clone();
        self.updated_at = now;
    }
}

/// Full field set for a contact, as supplied to a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactData {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company_id: Option<CompanyId>,
}

/// An organization record. `name` is the only required field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Company {
    pub fn new(id: impl Into<CompanyId>, name: impl Into<String>) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: id.into(),
            name: name.into(),
            domain: None,
            website: None,
            phone: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn apply(&mut self, data: &CompanyData, now: NaiveDateTime) {
        self.name = data.name.clone();
        self.domain = data.domain.clone();
        self.website = data.website.clone();
        self.phone = data.phone.clone();
        self.updated_at = now;
    }
}

/// Full field set for a company, as supplied to a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

//------------------------------------------------------------------------------
// DEPENDENT RECORDS
//------------------------------------------------------------------------------
// These are never matched; a merge only rewrites the foreign keys they hold.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelatedType {
    Contact,
    Company,
    Deal,
}

impl RelatedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelatedType::Contact => "contact",
            RelatedType::Company => "company",
            RelatedType::Deal => "deal",
        }
    }
}

impl From<EntityKind> for RelatedType {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Contact => RelatedType::Contact,
            EntityKind::Company => RelatedType::Company,
        }
    }
}

/// Timeline item attached to a contact, company or deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: ActivityId,
    pub related_type: RelatedType,
    pub related_id: String,
    #[serde(default)]
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub contact_id: ContactId,
    #[serde(default)]
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: DealId,
    pub title: String,
    #[serde(default)]
    pub company_id: Option<CompanyId>,
    #[serde(default)]
    pub contact_ids: Vec<ContactId>,
}

/// Append-only record written once per merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: uuid::Uuid,
    pub action: String,
    pub entity_type: EntityKind,
    pub entity_id: String,
    pub metadata: serde_json::Value,
    pub timestamp: NaiveDateTime,
    pub system: bool,
}
