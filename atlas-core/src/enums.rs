//! Enum types for Atlas records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// SKILL TYPES
// ============================================================================

/// Core skill types an entity can specialise in.
///
/// Specialisation maps are keyed by `as_str()` and may also carry ad hoc
/// keys outside this set (introduced by discovery).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillType {
    Research,
    DataAnalysis,
    ContentCreation,
    CodeGeneration,
    CustomerSupport,
    Communication,
    Scheduling,
    Planning,
    Monitoring,
    Reporting,
    Automation,
    GeneralProcessing,
}

impl SkillType {
    /// Every core skill type, in declaration order.
    pub const ALL: [SkillType; 12] = [
        SkillType::Research,
        SkillType::DataAnalysis,
        SkillType::ContentCreation,
        SkillType::CodeGeneration,
        SkillType::CustomerSupport,
        SkillType::Communication,
        SkillType::Scheduling,
        SkillType::Planning,
        SkillType::Monitoring,
        SkillType::Reporting,
        SkillType::Automation,
        SkillType::GeneralProcessing,
    ];

    /// Number of known core skill types.
    pub const COUNT: usize = Self::ALL.len();

    /// Key used in specialisation maps and persisted rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillType::Research => "research",
            SkillType::DataAnalysis => "data_analysis",
            SkillType::ContentCreation => "content_creation",
            SkillType::CodeGeneration => "code_generation",
            SkillType::CustomerSupport => "customer_support",
            SkillType::Communication => "communication",
            SkillType::Scheduling => "scheduling",
            SkillType::Planning => "planning",
            SkillType::Monitoring => "monitoring",
            SkillType::Reporting => "reporting",
            SkillType::Automation => "automation",
            SkillType::GeneralProcessing => "general_processing",
        }
    }

    /// Parse a specialisation key. Unknown keys return `None`.
    pub fn from_key(key: &str) -> Option<Self> {
        let normalized = key.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|s| s.as_str() == normalized)
    }
}

impl fmt::Display for SkillType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkillType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s).ok_or_else(|| ParseEnumError::new("skill type", s))
    }
}

// ============================================================================
// MEMORY / EVENT TAGS
// ============================================================================

/// Tag on a memory record describing where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Experience,
    Skill,
    Preference,
    Relationship,
    Insight,
    Feedback,
    CollectiveLearning,
    Crystallized,
    ReceivedCrystal,
    WebKnowledge,
    VisualIntelligence,
    TaskPatternDiscovery,
}

impl MemoryType {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            MemoryType::Experience => "experience",
            MemoryType::Skill => "skill",
            MemoryType::Preference => "preference",
            MemoryType::Relationship => "relationship",
            MemoryType::Insight => "insight",
            MemoryType::Feedback => "feedback",
            MemoryType::CollectiveLearning => "collective_learning",
            MemoryType::Crystallized => "crystallized",
            MemoryType::ReceivedCrystal => "received_crystal",
            MemoryType::WebKnowledge => "web_knowledge",
            MemoryType::VisualIntelligence => "visual_intelligence",
            MemoryType::TaskPatternDiscovery => "task_pattern_discovery",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "experience" => Ok(MemoryType::Experience),
            "skill" => Ok(MemoryType::Skill),
            "preference" => Ok(MemoryType::Preference),
            "relationship" => Ok(MemoryType::Relationship),
            "insight" => Ok(MemoryType::Insight),
            "feedback" => Ok(MemoryType::Feedback),
            "collective_learning" => Ok(MemoryType::CollectiveLearning),
            "crystallized" => Ok(MemoryType::Crystallized),
            "received_crystal" => Ok(MemoryType::ReceivedCrystal),
            "web_knowledge" => Ok(MemoryType::WebKnowledge),
            "visual_intelligence" => Ok(MemoryType::VisualIntelligence),
            "task_pattern_discovery" => Ok(MemoryType::TaskPatternDiscovery),
            _ => Err(ParseEnumError::new("memory type", s)),
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for MemoryType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Tag on a learning event (audit record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningEventType {
    CollectiveTransfer,
    ParallelLearning,
    AdversarialOutcome,
    MemoryCrystallization,
    KnowledgeAbsorption,
    TaskDiscovery,
    BenchmarkTemplate,
    EvolutionSummary,
}

impl LearningEventType {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            LearningEventType::CollectiveTransfer => "collective_transfer",
            LearningEventType::ParallelLearning => "parallel_learning",
            LearningEventType::AdversarialOutcome => "adversarial_outcome",
            LearningEventType::MemoryCrystallization => "memory_crystallization",
            LearningEventType::KnowledgeAbsorption => "knowledge_absorption",
            LearningEventType::TaskDiscovery => "task_discovery",
            LearningEventType::BenchmarkTemplate => "benchmark_template",
            LearningEventType::EvolutionSummary => "evolution_summary",
        }
    }
}

impl fmt::Display for LearningEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Relationship kind between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Competitive,
}

impl RelationshipType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            RelationshipType::Competitive => "competitive",
        }
    }
}

// ============================================================================
// TASK QUEUE ENUMS
// ============================================================================

/// Priority of a task-queue item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 4] = [
        TaskPriority::Low,
        TaskPriority::Medium,
        TaskPriority::High,
        TaskPriority::Urgent,
    ];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }

    /// Lenient parse used on model output. Unrecognised text maps to `Medium`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" | "minor" => TaskPriority::Low,
            "high" | "important" => TaskPriority::High,
            "urgent" | "critical" => TaskPriority::Urgent,
            _ => TaskPriority::Medium,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Status of a task-queue item. The engine only ever creates `Pending` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

// ============================================================================
// PARSE ERROR
// ============================================================================

/// Error when parsing an invalid enum string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skill_type_keys_roundtrip() {
        for skill in SkillType::ALL {
            assert_eq!(SkillType::from_key(skill.as_str()), Some(skill));
        }
        assert_eq!(SkillType::COUNT, 12);
    }

    #[test]
    fn test_skill_type_from_key_normalizes() {
        assert_eq!(SkillType::from_key("Data-Analysis"), Some(SkillType::DataAnalysis));
        assert_eq!(SkillType::from_key("visual_design"), None);
    }

    #[test]
    fn test_memory_type_db_strings() {
        assert_eq!(MemoryType::ReceivedCrystal.as_db_str(), "received_crystal");
        assert_eq!(
            MemoryType::from_db_str("TASK_PATTERN_DISCOVERY"),
            Ok(MemoryType::TaskPatternDiscovery)
        );
        assert!(MemoryType::from_db_str("dream").is_err());
    }

    #[test]
    fn test_task_priority_lenient() {
        assert_eq!(TaskPriority::parse_lenient("CRITICAL"), TaskPriority::Urgent);
        assert_eq!(TaskPriority::parse_lenient("high"), TaskPriority::High);
        assert_eq!(TaskPriority::parse_lenient("whenever"), TaskPriority::Medium);
    }

    #[test]
    fn test_relationship_type_keys_ordered_map() {
        let a = uuid::Uuid::nil();
        let mut map = std::collections::BTreeMap::new();
        map.insert((a, a, RelationshipType::Competitive), 1);
        map.insert((a, a, RelationshipType::Competitive), 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map[&(a, a, RelationshipType::Competitive)], 2);
    }

    #[test]
    fn test_parse_error_display() {
        let err = "nope".parse::<SkillType>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid skill type: nope");
    }
}
