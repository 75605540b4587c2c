//! Research topics per sector for external-knowledge queries.

use rand::seq::IndexedRandom;
use rand::Rng;

const GENERAL: &[&str] = &[
    "emerging automation practices for small teams",
    "recent advances in workflow orchestration",
    "effective knowledge management techniques",
    "best practices for data quality monitoring",
    "current trends in customer communication",
];

const FINANCE: &[&str] = &[
    "regulatory reporting changes this year",
    "fraud detection patterns in digital payments",
    "cash flow forecasting methods",
    "automation of accounts payable workflows",
];

const HEALTHCARE: &[&str] = &[
    "patient scheduling optimisation",
    "clinical documentation automation",
    "healthcare data interoperability standards",
    "remote patient monitoring workflows",
];

const RETAIL: &[&str] = &[
    "inventory demand forecasting",
    "personalised product recommendations",
    "omnichannel customer support practices",
    "supply chain disruption handling",
];

const TECHNOLOGY: &[&str] = &[
    "incident response automation",
    "code review practices at scale",
    "observability for distributed systems",
    "secure software supply chains",
];

const MARKETING: &[&str] = &[
    "content calendar planning",
    "campaign performance attribution",
    "audience segmentation techniques",
];

const LEGAL: &[&str] = &[
    "contract review automation",
    "compliance monitoring workflows",
    "legal research tooling",
];

/// Topic list for a sector label, case-insensitive. Unknown sectors use
/// the general list.
pub fn topics_for(sector: &str) -> &'static [&'static str] {
    match sector.trim().to_uppercase().as_str() {
        "FINANCE" | "FINANCIAL" | "BANKING" => FINANCE,
        "HEALTHCARE" | "HEALTH" | "MEDICAL" => HEALTHCARE,
        "RETAIL" | "ECOMMERCE" | "E-COMMERCE" => RETAIL,
        "TECHNOLOGY" | "TECH" | "SOFTWARE" => TECHNOLOGY,
        "MARKETING" => MARKETING,
        "LEGAL" => LEGAL,
        _ => GENERAL,
    }
}

/// One topic for `sector`, chosen at random.
pub fn pick_topic<R: Rng + ?Sized>(sector: &str, rng: &mut R) -> &'static str {
    topics_for(sector).choose(rng).copied().unwrap_or(GENERAL[0])
}
