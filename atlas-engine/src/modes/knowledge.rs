//! External-knowledge absorption: one search query per sampled sector,
//! fanned out to every entity in that sector.

use super::{sample_sectors, topics};
use crate::context::ModeContext;
use crate::outcome::ModeOutcome;
use atlas_core::{
    with_retry, AtlasResult, Entity, LearningEvent, LearningEventType, MemoryRecord, MemoryType,
    SkillType,
};
use atlas_llm::{KnowledgeRequest, KnowledgeResponse};
use rand::rngs::StdRng;
use serde_json::json;

const SYSTEM_PROMPT: &str = "You are a research assistant. Summarise current, practical, \
    well-sourced knowledge on the topic in a few dense paragraphs.";

/// Skills every absorbing entity improves.
pub const ABSORBING_SKILLS: [SkillType; 2] = [SkillType::Research, SkillType::GeneralProcessing];

/// Prompt for one sector and topic.
pub fn build_request(sector: &str, topic: &str, max_tokens: u32, temperature: f32) -> KnowledgeRequest {
    KnowledgeRequest::new(
        SYSTEM_PROMPT,
        format!("Sector: {sector}. What are the latest developments in {topic}?"),
    )
    .with_max_tokens(max_tokens)
    .with_temperature(temperature)
}

/// First `max_chars` characters of `content`.
pub fn truncate_chars(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

pub async fn run(
    ctx: &ModeContext<'_>,
    population: &mut [Entity],
    rng: &mut StdRng,
) -> AtlasResult<ModeOutcome> {
    let cfg = &ctx.config.knowledge;
    let mut outcome = ModeOutcome::default();

    let provider = match ctx.providers.knowledge() {
        Ok(provider) => provider,
        Err(e) => {
            tracing::warn!(error = %e, "Knowledge absorption skipped: no provider");
            return Ok(outcome);
        }
    };

    let sectors = sample_sectors(population, cfg.sectors_per_intensity, ctx.intensity, rng);
    tracing::info!(
        sectors = sectors.len(),
        provider = provider.provider_name(),
        "Knowledge absorption started"
    );

    for (sector, members) in sectors {
        let topic = topics::pick_topic(&sector, rng);
        let request = build_request(&sector, topic, cfg.max_tokens, cfg.temperature);

        let answer = with_retry(&ctx.config.external_retry, "knowledge_query", || {
            provider.query(&request)
        })
        .await;

        match answer {
            Ok(answer) => {
                absorb(ctx, population, &members, &sector, topic, answer, &mut outcome).await;
            }
            Err(e) => {
                tracing::warn!(sector = %sector, topic, error = %e, "Knowledge query failed, sector skipped");
            }
        }

        let delay = cfg.inter_call_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    tracing::info!(
        touched = outcome.touched(),
        knowledge_gained = outcome.knowledge_gained,
        "Knowledge absorption finished"
    );
    Ok(outcome)
}

async fn absorb(
    ctx: &ModeContext<'_>,
    population: &mut [Entity],
    members: &[usize],
    sector: &str,
    topic: &str,
    answer: KnowledgeResponse,
    outcome: &mut ModeOutcome,
) {
    let cfg = &ctx.config.knowledge;
    let content = truncate_chars(&answer.content, cfg.max_content_chars);
    let citations: Vec<&String> = answer.citations.iter().take(cfg.max_citations).collect();
    let boost = ctx.intensity * cfg.skill_boost;

    let mut memories = Vec::with_capacity(members.len());
    let mut events = Vec::with_capacity(members.len());

    for &i in members {
        let entity = &mut population[i];
        let gain: f64 = ABSORBING_SKILLS
            .iter()
            .map(|skill| entity.task_specializations.raise(skill.as_str(), boost))
            .sum();

        memories.push(
            MemoryRecord::new(entity.entity_id, MemoryType::WebKnowledge, content.clone(), cfg.memory_importance)
                .with_owner(entity.owner_id)
                .with_context(json!({
                    "sector": sector,
                    "topic": topic,
                    "citations": citations,
                    "requestId": ctx.request_id,
                })),
        );
        events.push(LearningEvent::new(
            entity.entity_id,
            LearningEventType::KnowledgeAbsorption,
            json!({ "sector": sector, "topic": topic, "knowledgeGained": gain }),
            gain,
        ));
        outcome.record(entity, gain);
    }

    let touched: Vec<&Entity> = members.iter().map(|&i| &population[i]).collect();
    ctx.persist(outcome, &memories, &events, &touched).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::{AtlasError, LlmError};
    use atlas_storage::PopulationFilter;
    use atlas_test_utils::fixtures::{fast_config, fast_writer, population, seeded_rng, store_with};
    use atlas_test_utils::MockKnowledgeProvider;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_delay_follows_every_sector_including_failures() {
        let mut population = population(6);
        let store = store_with(population.clone());
        let writer = fast_writer(&store);
        let mock = MockKnowledgeProvider::new("Ledger automation is maturing");
        mock.push(Err(AtlasError::Llm(LlmError::RequestFailed {
            provider: "mock".to_string(),
            status: 400,
            message: "bad model".to_string(),
        })));
        let providers = mock.registry();
        let mut config = fast_config();
        config.knowledge.inter_call_delay_ms = 1_000;
        let filter = PopulationFilter::default();
        let ctx = ModeContext {
            writer: &writer,
            providers: &providers,
            config: &config,
            intensity: 3.0,
            filter: &filter,
            request_id: "req-delay",
        };

        let start = Instant::now();
        let outcome = run(&ctx, &mut population, &mut seeded_rng(4)).await.unwrap();
        let elapsed = start.elapsed();

        // three sectors of two members, one query failed
        assert_eq!(mock.call_count(), 3);
        assert_eq!(outcome.touched(), 4);
        assert!(elapsed >= Duration::from_millis(3_000), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(4_000), "elapsed {elapsed:?}");
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn test_request_mentions_sector_and_topic() {
        let request = build_request("RETAIL", "inventory demand forecasting", 512, 0.3);
        assert!(request.user_prompt.contains("RETAIL"));
        assert!(request.user_prompt.contains("inventory demand forecasting"));
        assert_eq!(request.max_tokens, 512);
    }
}
