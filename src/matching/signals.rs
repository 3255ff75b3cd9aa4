// src/matching/signals.rs - per-kind signal tables and the generic pair evaluator

use log::trace;
use std::fmt;
use std::hash::Hash;

use crate::matching::email::{extract_email_domain, is_free_email_domain, normalize_email};
use crate::matching::name::{normalize_name, similarity, strip_company_name};
use crate::matching::phone::{phones_equal, phones_overlap};
use crate::matching::url::{normalize_domain, normalize_website};
use crate::models::{Company, Contact, EntityKind, MatchReason, MatchResult};

const EXACT_EMAIL_WEIGHT: f64 = 1.0;
const CONTACT_PHONE_WEIGHT: f64 = 0.9;
const SAME_LAST_NAME_WEIGHT: f64 = 0.5;
const SAME_LAST_NAME_DIFFERENT_FIRST_WEIGHT: f64 = 0.4;
const EMAIL_DOMAIN_WEIGHT: f64 = 0.3;

const EXACT_DOMAIN_WEIGHT: f64 = 1.0;
const SAME_COMPANY_NAME_WEIGHT: f64 = 0.95;
const COMPANY_NAME_SIMILARITY_FACTOR: f64 = 0.8;
const WEBSITE_WEIGHT: f64 = 0.9;
const COMPANY_PHONE_WEIGHT: f64 = 0.7;

/// Which comparison path is running. All-pairs clustering is unsupervised over the
/// whole collection, so it uses stricter name thresholds and skips the weakest signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchProfile {
    /// One source entity against the collection (candidate search).
    SingleTarget,
    /// Every entity against every other (cluster pass).
    AllPairs,
}

impl MatchProfile {
    pub fn contact_name_threshold(&self) -> f64 {
        match self {
            MatchProfile::SingleTarget => 0.8,
            MatchProfile::AllPairs => 0.9,
        }
    }

    pub fn contact_name_factor(&self) -> f64 {
        match self {
            MatchProfile::SingleTarget => 0.7,
            MatchProfile::AllPairs => 0.8,
        }
    }

    pub fn company_name_threshold(&self) -> f64 {
        match self {
            MatchProfile::SingleTarget => 0.8,
            MatchProfile::AllPairs => 0.85,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalScope {
    Always,
    SingleTargetOnly,
}

pub type SignalHit = (MatchReason, f64);

/// One row of a signal table: a named predicate that may contribute a weighted reason.
pub struct Signal<T> {
    pub name: &'static str,
    pub scope: SignalScope,
    pub evaluate: fn(&T, &T, MatchProfile) -> Option<SignalHit>,
}

impl<T> Signal<T> {
    fn runs_under(&self, profile: MatchProfile) -> bool {
        match self.scope {
            SignalScope::Always => true,
            SignalScope::SingleTargetOnly => profile == MatchProfile::SingleTarget,
        }
    }
}

/// An entity kind the engine can compare.
pub trait Matchable: Clone + 'static {
    type Id: Clone + Eq + Hash + fmt::Display + fmt::Debug;

    const KIND: EntityKind;

    fn id(&self) -> &Self::Id;

    /// Signals in evaluation order; reasons are reported in this order.
    fn signals() -> &'static [Signal<Self>];
}

/// Runs the kind's signal table over a pair. Confidence is the mean of the fired weights.
pub fn evaluate<T: Matchable>(a: &T, b: &T, profile: MatchProfile) -> MatchResult {
    let hits: Vec<SignalHit> = T::signals()
        .iter()
        .filter(|signal| signal.runs_under(profile))
        .filter_map(|signal| {
            let hit = (signal.evaluate)(a, b, profile)?;
            trace!("{} {} ~ {}: {} fired ({:.2})", T::KIND, a.id(), b.id(), signal.name, hit.1);
            Some(hit)
        })
        .collect();
    MatchResult::from_hits(hits)
}

/// Trimmed, non-empty field value.
fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn both<'a>(a: &'a Option<String>, b: &'a Option<String>) -> Option<(&'a str, &'a str)> {
    Some((present(a)?, present(b)?))
}

//------------------------------------------------------------------------------
// CONTACT SIGNALS
//------------------------------------------------------------------------------

static CONTACT_SIGNALS: [Signal<Contact>; 4] = [
    Signal {
        name: "exact_email",
        scope: SignalScope::Always,
        evaluate: contact_exact_email,
    },
    Signal {
        name: "phone",
        scope: SignalScope::Always,
        evaluate: contact_phone,
    },
    Signal {
        name: "name",
        scope: SignalScope::Always,
        evaluate: contact_name,
    },
    Signal {
        name: "email_domain",
        scope: SignalScope::SingleTargetOnly,
        evaluate: contact_email_domain,
    },
];

fn contact_exact_email(a: &Contact, b: &Contact, _: MatchProfile) -> Option<SignalHit> {
    let (email_a, email_b) = both(&a.email, &b.email)?;
    (normalize_email(email_a) == normalize_email(email_b))
        .then_some((MatchReason::ExactEmail, EXACT_EMAIL_WEIGHT))
}

fn contact_phone(a: &Contact, b: &Contact, _: MatchProfile) -> Option<SignalHit> {
    let (phone_a, phone_b) = both(&a.phone, &b.phone)?;
    phones_overlap(phone_a, phone_b).then_some((MatchReason::PhoneNumber, CONTACT_PHONE_WEIGHT))
}

/// At most one of "Similar name" / "Same last name" fires.
fn contact_name(a: &Contact, b: &Contact, profile: MatchProfile) -> Option<SignalHit> {
    let last_a = normalize_name(&a.last_name);
    let last_b = normalize_name(&b.last_name);
    if last_a.is_empty() || last_b.is_empty() {
        return None;
    }

    let threshold = profile.contact_name_threshold();
    let last_sim = similarity(&last_a, &last_b);
    if last_sim < threshold {
        return None;
    }

    let first_names = both(&a.first_name, &b.first_name);
    if let Some((first_a, first_b)) = first_names {
        let first_sim = similarity(&normalize_name(first_a), &normalize_name(first_b));
        if first_sim >= threshold {
            let weight = (first_sim + last_sim) / 2.0 * profile.contact_name_factor();
            return Some((MatchReason::SimilarName, weight));
        }
    }

    if last_sim == 1.0 {
        let weight = if first_names.is_some() {
            SAME_LAST_NAME_DIFFERENT_FIRST_WEIGHT
        } else {
            SAME_LAST_NAME_WEIGHT
        };
        return Some((MatchReason::SameLastName, weight));
    }
    None
}

fn contact_email_domain(a: &Contact, b: &Contact, _: MatchProfile) -> Option<SignalHit> {
    let (email_a, email_b) = both(&a.email, &b.email)?;
    let (email_a, email_b) = (normalize_email(email_a), normalize_email(email_b));
    if email_a == email_b {
        return None;
    }
    let domain_a = extract_email_domain(&email_a)?;
    let domain_b = extract_email_domain(&email_b)?;
    (domain_a == domain_b && !is_free_email_domain(&domain_a))
        .then_some((MatchReason::SameEmailDomain, EMAIL_DOMAIN_WEIGHT))
}

impl Matchable for Contact {
    type Id = crate::models::ContactId;

    const KIND: EntityKind = EntityKind::Contact;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn signals() -> &'static [Signal<Self>] {
        &CONTACT_SIGNALS
    }
}

//------------------------------------------------------------------------------
// COMPANY SIGNALS
//------------------------------------------------------------------------------

static COMPANY_SIGNALS: [Signal<Company>; 4] = [
    Signal {
        name: "exact_domain",
        scope: SignalScope::Always,
        evaluate: company_domain,
    },
    Signal {
        name: "name",
        scope: SignalScope::Always,
        evaluate: company_name,
    },
    Signal {
        name: "website",
        scope: SignalScope::SingleTargetOnly,
        evaluate: company_website,
    },
    Signal {
        name: "phone",
        scope: SignalScope::SingleTargetOnly,
        evaluate: company_phone,
    },
];

fn company_domain(a: &Company, b: &Company, _: MatchProfile) -> Option<SignalHit> {
    let (domain_a, domain_b) = both(&a.domain, &b.domain)?;
    let domain_a = normalize_domain(domain_a);
    (!domain_a.is_empty() && domain_a == normalize_domain(domain_b))
        .then_some((MatchReason::ExactDomain, EXACT_DOMAIN_WEIGHT))
}

fn company_name(a: &Company, b: &Company, profile: MatchProfile) -> Option<SignalHit> {
    let name_a = strip_company_name(&a.name);
    let name_b = strip_company_name(&b.name);
    if name_a.is_empty() || name_b.is_empty() {
        return None;
    }
    if name_a == name_b {
        return Some((MatchReason::SameCompanyName, SAME_COMPANY_NAME_WEIGHT));
    }
    let sim = similarity(&name_a, &name_b);
    (sim >= profile.company_name_threshold()).then(|| {
        (
            MatchReason::SimilarCompanyName,
            sim * COMPANY_NAME_SIMILARITY_FACTOR,
        )
    })
}

fn company_website(a: &Company, b: &Company, _: MatchProfile) -> Option<SignalHit> {
    let (site_a, site_b) = both(&a.website, &b.website)?;
    let site_a = normalize_website(site_a);
    (!site_a.is_empty() && site_a == normalize_website(site_b))
        .then_some((MatchReason::SameWebsite, WEBSITE_WEIGHT))
}

fn company_phone(a: &Company, b: &Company, _: MatchProfile) -> Option<SignalHit> {
    let (phone_a, phone_b) = both(&a.phone, &b.phone)?;
    phones_equal(phone_a, phone_b).then_some((MatchReason::SamePhone, COMPANY_PHONE_WEIGHT))
}

impl Matchable for Company {
    type Id = crate::models::CompanyId;

    const KIND: EntityKind = EntityKind::Company;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn signals() -> &'static [Signal<Self>] {
        &COMPANY_SIGNALS
    }
}
