//! Task-pattern discovery: ask the knowledge provider for recurring tasks
//! per sector, queue them for the best-matching entity, then hand the whole
//! batch to benchmark enhancement.

use super::{benchmark, sample_sectors};
use crate::context::ModeContext;
use crate::outcome::ModeOutcome;
use atlas_core::{
    clamp, clamp_unit, with_retry, AtlasResult, Entity, LearningEvent, LearningEventType,
    MemoryRecord, MemoryType, SkillType, TaskPriority, TaskQueueItem,
};
use atlas_llm::KnowledgeRequest;
use rand::rngs::StdRng;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;

const SYSTEM_PROMPT: &str = "You identify recurring operational tasks. Reply with a JSON array \
    only. Each element has: title, description, type (one of research, data_analysis, \
    content_creation, code_generation, customer_support, communication, scheduling, planning, \
    monitoring, reporting, automation, general_processing), priority (low, medium, high, urgent), \
    complexity (1-10) and automationPotential (0-1).";

pub const DEFAULT_COMPLEXITY: f64 = 5.0;

// ============================================================================
// DISCOVERED TASKS
// ============================================================================

/// One task descriptor parsed from a discovery answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredTask {
    pub title: String,
    pub description: String,
    /// Specialisation key the task exercises.
    pub skill: String,
    pub priority: TaskPriority,
    /// In [1, 10].
    pub complexity: f64,
    /// In [0, 1].
    pub automation_potential: f64,
    pub sector: String,
}

/// Specialisation key for a free-form task type. Known skill types map to
/// their canonical key, anything else becomes an ad hoc key.
pub fn skill_key(task_type: &str) -> String {
    if let Some(skill) = SkillType::from_key(task_type) {
        return skill.as_str().to_string();
    }
    let normalized: String = task_type
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let normalized = normalized.trim_matches('_').to_string();
    if normalized.is_empty() {
        SkillType::GeneralProcessing.as_str().to_string()
    } else {
        normalized
    }
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (```json)
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

fn text_field(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(|v| v.as_str().map(str::trim).filter(|s| !s.is_empty()))
        .map(str::to_string)
}

fn number_field(obj: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn task_from_value(obj: &Value, sector: &str) -> Option<DiscoveredTask> {
    let title = text_field(obj, &["title", "name"])?;
    let task_type = text_field(obj, &["type", "taskType", "task_type", "skill"]).unwrap_or_default();
    let complexity = number_field(obj, &["complexity"])
        .filter(|c| c.is_finite())
        .map(|c| clamp(c, 1.0, 10.0))
        .unwrap_or(DEFAULT_COMPLEXITY);
    let automation_potential = number_field(obj, &["automationPotential", "automation_potential"])
        .map(clamp_unit)
        .unwrap_or(0.0);

    Some(DiscoveredTask {
        description: text_field(obj, &["description", "details"]).unwrap_or_else(|| title.clone()),
        title,
        skill: skill_key(&task_type),
        priority: text_field(obj, &["priority"])
            .map(|p| TaskPriority::parse_lenient(&p))
            .unwrap_or_default(),
        complexity,
        automation_potential,
        sector: sector.to_string(),
    })
}

/// Parse a discovery answer into at most `limit` tasks.
///
/// Malformed answers produce an empty list; elements without a title are
/// dropped.
pub fn parse_discovered(content: &str, sector: &str, limit: usize) -> Vec<DiscoveredTask> {
    let body = strip_code_fence(content);
    let (Some(start), Some(end)) = (body.find('['), body.rfind(']')) else {
        tracing::warn!(sector, "Discovery answer has no JSON array");
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<Value>>(&body[start..=end]) {
        Ok(items) => items
            .iter()
            .filter_map(|item| task_from_value(item, sector))
            .take(limit)
            .collect(),
        Err(e) => {
            tracing::warn!(sector, error = %e, "Discovery answer is not valid JSON");
            Vec::new()
        }
    }
}

/// Index of the member with the highest score on `skill`. The earliest
/// member wins ties.
pub fn best_match(population: &[Entity], members: &[usize], skill: &str) -> Option<usize> {
    members.iter().copied().fold(None, |best, i| match best {
        Some(b) if population[b].task_specializations.score(skill)
            >= population[i].task_specializations.score(skill) =>
        {
            Some(b)
        }
        _ => Some(i),
    })
}

/// Queue item for `task`, assigned to `assignee`.
pub fn queue_item(task: &DiscoveredTask, assignee: &Entity, request_id: &str) -> TaskQueueItem {
    let mut item = TaskQueueItem::new(
        task.title.clone(),
        task.skill.clone(),
        task.description.clone(),
        task.priority,
    );
    item.assigned_entities = vec![assignee.entity_id];
    item.owner_id = assignee.owner_id;
    item.assignment_rationale = format!(
        "Highest {} score in {} ({:.2})",
        task.skill,
        task.sector,
        assignee.task_specializations.score(&task.skill)
    );
    item.input_data = json!({
        "source": "discovery",
        "sector": task.sector,
        "complexity": task.complexity,
        "automationPotential": task.automation_potential,
        "requestId": request_id,
    });
    item
}

fn build_request(sector: &str, limit: usize, max_tokens: u32, temperature: f32) -> KnowledgeRequest {
    KnowledgeRequest::new(
        SYSTEM_PROMPT,
        format!("List up to {limit} recurring tasks that teams in the {sector} sector handle today."),
    )
    .with_max_tokens(max_tokens)
    .with_temperature(temperature)
}

// ============================================================================
// EXECUTOR
// ============================================================================

pub async fn run(
    ctx: &ModeContext<'_>,
    population: &mut [Entity],
    rng: &mut StdRng,
) -> AtlasResult<ModeOutcome> {
    let cfg = &ctx.config.discovery;
    let mut outcome = ModeOutcome::default();

    let provider = match ctx.providers.knowledge() {
        Ok(provider) => provider,
        Err(e) => {
            tracing::warn!(error = %e, "Task discovery skipped: no provider");
            return Ok(outcome);
        }
    };

    let sectors = sample_sectors(population, cfg.sectors_per_intensity, ctx.intensity, rng);
    tracing::info!(sectors = sectors.len(), "Task discovery started");
    let mut discovered_all = Vec::new();

    for (sector, members) in sectors {
        let request = build_request(&sector, cfg.max_tasks_per_sector, cfg.max_tokens, cfg.temperature);
        let answer = with_retry(&ctx.config.external_retry, "discovery_query", || {
            provider.query(&request)
        })
        .await;

        match answer {
            Ok(answer) => {
                let tasks = parse_discovered(&answer.content, &sector, cfg.max_tasks_per_sector);
                tracing::debug!(sector = %sector, tasks = tasks.len(), "Tasks discovered");
                if !tasks.is_empty() {
                    seed_sector(ctx, population, &members, &sector, &tasks, &mut outcome).await;
                    discovered_all.extend(tasks);
                }
            }
            Err(e) => {
                tracing::warn!(sector = %sector, error = %e, "Discovery query failed, sector skipped");
            }
        }

        let delay = cfg.inter_call_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    if !discovered_all.is_empty() {
        outcome.merge(benchmark::enhance(ctx, population, &discovered_all, rng).await);
    }

    tracing::info!(
        tasks_discovered = outcome.tasks_discovered,
        tasks_seeded = outcome.tasks_seeded,
        knowledge_gained = outcome.knowledge_gained,
        "Task discovery finished"
    );
    Ok(outcome)
}

async fn seed_sector(
    ctx: &ModeContext<'_>,
    population: &mut [Entity],
    members: &[usize],
    sector: &str,
    tasks: &[DiscoveredTask],
    outcome: &mut ModeOutcome,
) {
    let cfg = &ctx.config.discovery;

    let queue: Vec<TaskQueueItem> = tasks
        .iter()
        .filter_map(|task| {
            best_match(population, members, &task.skill)
                .map(|i| queue_item(task, &population[i], ctx.request_id))
        })
        .collect();
    outcome.inserts.merge(ctx.writer.insert(&queue).await);
    outcome.tasks_discovered += tasks.len();

    let skills: BTreeSet<&str> = tasks.iter().map(|t| t.skill.as_str()).collect();
    let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
    let boost = ctx.intensity * cfg.skill_boost;
    let mut memories = Vec::with_capacity(members.len());
    let mut events = Vec::with_capacity(members.len());

    for &i in members {
        let entity = &mut population[i];
        let gain: f64 = skills
            .iter()
            .map(|skill| entity.task_specializations.raise(skill, boost))
            .sum();
        memories.push(
            MemoryRecord::new(
                entity.entity_id,
                MemoryType::TaskPatternDiscovery,
                format!(
                    "Discovered {} task patterns in {}: {}",
                    tasks.len(),
                    sector,
                    titles.join("; ")
                ),
                cfg.memory_importance,
            )
            .with_owner(entity.owner_id)
            .with_context(json!({
                "sector": sector,
                "skills": skills,
                "requestId": ctx.request_id,
            })),
        );
        events.push(LearningEvent::new(
            entity.entity_id,
            LearningEventType::TaskDiscovery,
            json!({ "sector": sector, "tasks": tasks.len(), "knowledgeGained": gain }),
            gain,
        ));
        outcome.record(entity, gain);
    }

    let touched: Vec<&Entity> = members.iter().map(|&i| &population[i]).collect();
    ctx.persist(outcome, &memories, &events, &touched).await;
}
