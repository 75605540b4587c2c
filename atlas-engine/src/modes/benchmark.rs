//! Benchmark enhancement.
//!
//! Discovered tasks are folded into one template per skill: abstracted
//! title patterns, the observed complexity range, a normalised priority
//! distribution, success criteria and edge cases. Each template is logged
//! as a learning event and sampled to seed synthetic queue items.

use super::discovery::{best_match, DiscoveredTask};
use crate::context::ModeContext;
use crate::outcome::ModeOutcome;
use atlas_core::{
    clamp, shuffled_sample, BenchmarkConfig, Entity, LearningEvent, LearningEventType,
    TaskPriority, TaskQueueItem, POPULATION_SENTINEL_ID,
};
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

const DATE_TOKEN: &str = "{date}";
const NUMBER_TOKEN: &str = "{n}";
const GENERIC_CRITERION: &str = "Output is complete, accurate and delivered on time";

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{4}|q[1-4]\s+\d{4})\b",
    )
    .expect("Invalid date regex")
});

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+(?:[.,]\d+)?%?").expect("Invalid number regex"));

static CRITERIA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:ensure|verify|validate|confirm|reduce|increase|improve|deliver|complete|achieve|maintain|produce|identify)\b[^.;\n]{3,}",
    )
    .expect("Invalid criteria regex")
});

// ============================================================================
// TEMPLATES
// ============================================================================

/// Patterns observed for one skill.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkTemplate {
    pub skill: String,
    pub title_patterns: Vec<String>,
    pub complexity_min: f64,
    pub complexity_max: f64,
    pub complexity_avg: f64,
    pub samples: usize,
    /// Priority label to probability; sums to one.
    pub priority_distribution: BTreeMap<String, f64>,
    pub success_criteria: Vec<String>,
    pub edge_cases: Vec<String>,
}

impl BenchmarkTemplate {
    fn new(skill: &str) -> Self {
        Self {
            skill: skill.to_string(),
            title_patterns: Vec::new(),
            complexity_min: f64::MAX,
            complexity_max: f64::MIN,
            complexity_avg: 0.0,
            samples: 0,
            priority_distribution: BTreeMap::new(),
            success_criteria: Vec::new(),
            edge_cases: Vec::new(),
        }
    }

    fn observe(&mut self, task: &DiscoveredTask) {
        self.samples += 1;
        self.complexity_min = self.complexity_min.min(task.complexity);
        self.complexity_max = self.complexity_max.max(task.complexity);
        self.complexity_avg += (task.complexity - self.complexity_avg) / self.samples as f64;

        *self
            .priority_distribution
            .entry(task.priority.as_db_str().to_string())
            .or_insert(0.0) += 1.0;

        push_unique(&mut self.title_patterns, abstract_title(&task.title));
        for criterion in extract_criteria(&task.description) {
            push_unique(&mut self.success_criteria, criterion);
        }
        for case in edge_cases_for(&task.skill, task.complexity) {
            push_unique(&mut self.edge_cases, case.to_string());
        }
    }

    fn normalize(&mut self) {
        let total: f64 = self.priority_distribution.values().sum();
        if total > 0.0 {
            for weight in self.priority_distribution.values_mut() {
                *weight /= total;
            }
        }
    }

    /// Draw a priority from the distribution.
    pub fn sample_priority<R: Rng + ?Sized>(&self, rng: &mut R) -> TaskPriority {
        let mut roll: f64 = rng.random();
        for (label, weight) in &self.priority_distribution {
            if roll < *weight {
                return TaskPriority::parse_lenient(label);
            }
            roll -= weight;
        }
        self.priority_distribution
            .keys()
            .next_back()
            .map(|label| TaskPriority::parse_lenient(label))
            .unwrap_or_default()
    }

    /// Observed complexity range widened by `jitter` on each side, within [1, 10].
    pub fn complexity_bounds(&self, jitter: f64) -> (f64, f64) {
        let lo = clamp(self.complexity_min * (1.0 - jitter), 1.0, 10.0);
        let hi = clamp(self.complexity_max * (1.0 + jitter), 1.0, 10.0);
        (lo.min(hi), hi.max(lo))
    }
}

fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// Replace dates and numbers in a title with placeholders.
pub fn abstract_title(title: &str) -> String {
    let dated = DATE_RE.replace_all(title, DATE_TOKEN);
    NUMBER_RE.replace_all(&dated, NUMBER_TOKEN).into_owned()
}

/// Re-fill placeholders with plausible values.
pub fn fill_title<R: Rng + ?Sized>(pattern: &str, rng: &mut R) -> String {
    let mut title = pattern.to_string();
    while title.contains(DATE_TOKEN) {
        let date = (Utc::now() + Duration::days(rng.random_range(1..=90)))
            .format("%Y-%m-%d")
            .to_string();
        title = title.replacen(DATE_TOKEN, &date, 1);
    }
    while title.contains(NUMBER_TOKEN) {
        let n: u32 = rng.random_range(1..=100);
        title = title.replacen(NUMBER_TOKEN, &n.to_string(), 1);
    }
    title
}

/// Action-verb phrases in `description`, or a generic criterion.
pub fn extract_criteria(description: &str) -> Vec<String> {
    let found: Vec<String> = CRITERIA_RE
        .find_iter(description)
        .map(|m| m.as_str().trim().to_string())
        .collect();
    if found.is_empty() {
        vec![GENERIC_CRITERION.to_string()]
    } else {
        found
    }
}

fn edge_case_templates(skill: &str) -> &'static [&'static str] {
    match skill {
        "data_analysis" | "reporting" => &[
            "Input data contains missing values",
            "Source totals do not reconcile",
            "Dataset exceeds usual volume tenfold",
            "Figures arrive in mixed currencies or units",
        ],
        "customer_support" | "communication" => &[
            "Customer writes in another language",
            "Request is ambiguous or contradictory",
            "Customer escalates after first reply",
            "Message contains sensitive personal data",
        ],
        "scheduling" | "planning" => &[
            "Participants span several time zones",
            "Required resource is double-booked",
            "Deadline falls on a public holiday",
            "Dependencies form a cycle",
        ],
        "code_generation" | "automation" => &[
            "Upstream API returns an unexpected schema",
            "Operation must be retried idempotently",
            "Credentials expire mid-run",
            "Input exceeds configured size limits",
        ],
        "research" | "content_creation" => &[
            "Sources disagree with each other",
            "Topic has little recent coverage",
            "Output must fit a strict length limit",
        ],
        "monitoring" => &[
            "Metric stream goes silent",
            "Alert storm from a single root cause",
            "Threshold crossed only briefly",
        ],
        _ => &[
            "Required input is missing",
            "Task is interrupted midway",
            "Instructions change during execution",
        ],
    }
}

/// `ceil(complexity / 3)` edge cases for `skill`, at least one.
pub fn edge_cases_for(skill: &str, complexity: f64) -> Vec<&'static str> {
    let templates = edge_case_templates(skill);
    let count = ((complexity / 3.0).ceil().max(1.0) as usize).min(templates.len());
    templates[..count].to_vec()
}

/// One normalised template per skill seen in `tasks`.
pub fn build_templates(tasks: &[DiscoveredTask]) -> BTreeMap<String, BenchmarkTemplate> {
    let mut templates: BTreeMap<String, BenchmarkTemplate> = BTreeMap::new();
    for task in tasks {
        templates
            .entry(task.skill.clone())
            .or_insert_with(|| BenchmarkTemplate::new(&task.skill))
            .observe(task);
    }
    for template in templates.values_mut() {
        template.normalize();
    }
    templates
}

/// One synthetic queue item sampled from `template`.
pub fn synthesize<R: Rng + ?Sized>(
    template: &BenchmarkTemplate,
    cfg: &BenchmarkConfig,
    rng: &mut R,
) -> TaskQueueItem {
    let pattern = template
        .title_patterns
        .choose(rng)
        .map(String::as_str)
        .unwrap_or(template.skill.as_str());
    let title = fill_title(pattern, rng);
    let (lo, hi) = template.complexity_bounds(cfg.complexity_jitter);
    let complexity = rng.random_range(lo..=hi).round();
    let criteria = shuffled_sample(&template.success_criteria, cfg.max_criteria, rng);
    let edge_cases = shuffled_sample(&template.edge_cases, cfg.max_edge_cases, rng);

    let mut item = TaskQueueItem::new(
        title,
        template.skill.clone(),
        format!("Synthetic benchmark task for {}", template.skill),
        template.sample_priority(rng),
    );
    item.input_data = json!({
        "source": "benchmark",
        "synthetic": true,
        "complexity": complexity,
        "successCriteria": criteria,
        "edgeCases": edge_cases,
    });
    item
}

// ============================================================================
// EXECUTOR
// ============================================================================

/// Build templates from `discovered`, log them and seed synthetic tasks
/// assigned to the best entity in the population.
pub async fn enhance(
    ctx: &ModeContext<'_>,
    population: &[Entity],
    discovered: &[DiscoveredTask],
    rng: &mut StdRng,
) -> ModeOutcome {
    let cfg = &ctx.config.benchmark;
    let mut outcome = ModeOutcome::default();
    let templates = build_templates(discovered);
    let per_template = (ctx.intensity * cfg.synthetic_per_intensity).ceil().max(0.0) as usize;
    let everyone: Vec<usize> = (0..population.len()).collect();

    let mut events = Vec::with_capacity(templates.len());
    let mut synthetic = Vec::new();

    for template in templates.values() {
        events.push(LearningEvent::new(
            POPULATION_SENTINEL_ID,
            LearningEventType::BenchmarkTemplate,
            json!({ "template": template, "requestId": ctx.request_id }),
            (template.samples as f64 / 10.0).min(1.0),
        ));

        let assignee = best_match(population, &everyone, &template.skill).map(|i| &population[i]);
        for _ in 0..per_template {
            let mut item = synthesize(template, cfg, rng);
            if let Some(entity) = assignee {
                item.assigned_entities = vec![entity.entity_id];
                item.owner_id = entity.owner_id;
                item.assignment_rationale = format!(
                    "Highest {} score in population ({:.2})",
                    template.skill,
                    entity.task_specializations.score(&template.skill)
                );
            }
            item.input_data["requestId"] = json!(ctx.request_id);
            synthetic.push(item);
        }
    }

    outcome.inserts.merge(ctx.writer.insert(&events).await);
    outcome.inserts.merge(ctx.writer.insert(&synthetic).await);
    outcome.tasks_seeded = synthetic.len();

    tracing::info!(
        templates = templates.len(),
        tasks_seeded = outcome.tasks_seeded,
        "Benchmark enhancement finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_test_utils::fixtures::seeded_rng;

    fn task(title: &str, skill: &str, priority: TaskPriority, complexity: f64) -> DiscoveredTask {
        DiscoveredTask {
            title: title.to_string(),
            description: "Ensure every invoice is matched to a purchase order. Misc notes".to_string(),
            skill: skill.to_string(),
            priority,
            complexity,
            automation_potential: 0.5,
            sector: "FINANCE".to_string(),
        }
    }

    #[test]
    fn test_abstract_title_tokens() {
        assert_eq!(
            abstract_title("Close books for 2024-03-31 with 12 entries"),
            "Close books for {date} with {n} entries"
        );
        assert_eq!(abstract_title("Plan Q3 2025 budget"), "Plan {date} budget");
        assert_eq!(abstract_title("Triage inbox"), "Triage inbox");
    }

    #[test]
    fn test_fill_title_replaces_every_token() {
        let mut rng = seeded_rng(5);
        let title = fill_title("Report {n} issues by {date} and {n} more", &mut rng);
        assert!(!title.contains('{'));
    }

    #[test]
    fn test_extract_criteria_and_fallback() {
        let found = extract_criteria("Ensure every invoice is matched. Then relax.");
        assert_eq!(found, vec!["Ensure every invoice is matched".to_string()]);
        assert_eq!(extract_criteria("Just do it"), vec![GENERIC_CRITERION.to_string()]);
    }

    #[test]
    fn test_edge_case_count_scales_with_complexity() {
        assert_eq!(edge_cases_for("scheduling", 1.0).len(), 1);
        assert_eq!(edge_cases_for("scheduling", 7.0).len(), 3);
        assert_eq!(edge_cases_for("scheduling", 10.0).len(), 4);
        assert_eq!(edge_cases_for("invoice_triage", 10.0).len(), 3);
    }

    #[test]
    fn test_build_templates_aggregates() {
        let tasks = vec![
            task("Reconcile 3 ledgers", "data_analysis", TaskPriority::High, 4.0),
            task("Reconcile 9 ledgers", "data_analysis", TaskPriority::High, 8.0),
            task("Audit vendor list", "data_analysis", TaskPriority::Low, 6.0),
            task("Draft newsletter", "content_creation", TaskPriority::Medium, 3.0),
        ];
        let templates = build_templates(&tasks);
        assert_eq!(templates.len(), 2);

        let t = &templates["data_analysis"];
        assert_eq!(t.samples, 3);
        assert_eq!(t.complexity_min, 4.0);
        assert_eq!(t.complexity_max, 8.0);
        assert!((t.complexity_avg - 6.0).abs() < 1e-9);
        assert_eq!(t.title_patterns.len(), 2);
        let total: f64 = t.priority_distribution.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((t.priority_distribution["high"] - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(t.success_criteria.len(), 1);
    }

    #[test]
    fn test_synthesize_within_bounds() {
        let tasks = vec![
            task("Reconcile 3 ledgers", "data_analysis", TaskPriority::Urgent, 2.0),
            task("Reconcile 9 ledgers", "data_analysis", TaskPriority::Urgent, 9.0),
        ];
        let templates = build_templates(&tasks);
        let template = &templates["data_analysis"];
        let cfg = BenchmarkConfig::default();
        let mut rng = seeded_rng(9);

        for _ in 0..50 {
            let item = synthesize(template, &cfg, &mut rng);
            assert_eq!(item.priority, TaskPriority::Urgent);
            assert_eq!(item.task_type, "data_analysis");
            let complexity = item.input_data["complexity"].as_f64().unwrap();
            assert!((1.0..=10.0).contains(&complexity));
            assert!(item.input_data["successCriteria"].as_array().unwrap().len() <= cfg.max_criteria);
            assert!(!item.title.contains('{'));
        }
    }

    #[test]
    fn test_complexity_bounds_clamped() {
        let tasks = vec![task("x", "planning", TaskPriority::Low, 1.0), task("y", "planning", TaskPriority::Low, 10.0)];
        let templates = build_templates(&tasks);
        assert_eq!(templates["planning"].complexity_bounds(0.2), (1.0, 10.0));
    }
}
