//! Built-in test cases for the engineering documentation benchmark.
//!
//! Cases are stratified by difficulty:
//!
//! - **EASY**: a single fact stated plainly in one section.
//! - **MEDIUM**: needs context from a paragraph or two sections.
//! - **HARD**: facts buried mid-paragraph or spread across a page, needing
//!   several reasoning hops.

use super::{Difficulty, Importance, TestCase};

struct CaseDef {
    query: &'static str,
    expected_answer: &'static str,
    ground_truth_location: &'static str,
    difficulty: Difficulty,
    importance: Importance,
    category: &'static str,
    requires_reasoning: Option<&'static str>,
    why_hard: Option<&'static str>,
}

const fn easy(
    query: &'static str,
    expected_answer: &'static str,
    ground_truth_location: &'static str,
    importance: Importance,
    category: &'static str,
) -> CaseDef {
    CaseDef {
        query,
        expected_answer,
        ground_truth_location,
        difficulty: Difficulty::Easy,
        importance,
        category,
        requires_reasoning: None,
        why_hard: None,
    }
}

const DEFAULT_CASES: &[CaseDef] = &[
    easy(
        "What Kafka topic does the Order-Processor Service consume from?",
        "new-orders",
        "Order-Processor Service - Overview section",
        Importance::Medium,
        "Configuration",
    ),
    easy(
        "How many replicas does the Order-Processor Service have in production?",
        "3 replicas",
        "Order-Processor Service - Overview section",
        Importance::Medium,
        "Architecture",
    ),
    easy(
        "What programming language is the User-Profile Service written in?",
        "Java 17",
        "User-Profile Service - Tech Stack section",
        Importance::Low,
        "Technology",
    ),
    easy(
        "What framework does the Notification-Dispatcher Service use?",
        "Spring Boot 2.7.x",
        "Notification-Dispatcher Service - Overview section",
        Importance::Low,
        "Technology",
    ),
    easy(
        "How many retry attempts does Order-Processor have for standard errors?",
        "3 retry attempts with 3-second backoff",
        "Order-Processor Service - Error Handling section",
        Importance::Medium,
        "Error Handling",
    ),
    CaseDef {
        query: "What happens when the Payment Gateway has repeated 5xx errors?",
        expected_answer: "Kafka listener stops and orders are written to local H2 database file",
        ground_truth_location: "Order-Processor Service - Error Handling section, paragraph 2",
        difficulty: Difficulty::Medium,
        importance: Importance::High,
        category: "Error Handling",
        requires_reasoning: Some(
            "Must connect '5xx errors' with 'PAYMENT_HALT state' and understand the fallback mechanism",
        ),
        why_hard: None,
    },
    CaseDef {
        query: "Why was the Email Template Throttling project abandoned?",
        expected_answer:
            "In-memory ConcurrentHashMap approach doesn't work in multi-replica deployment",
        ground_truth_location: "Notification-Dispatcher Service - Project Backlog section",
        difficulty: Difficulty::Medium,
        importance: Importance::Medium,
        category: "Architecture",
        requires_reasoning: Some(
            "Must understand the connection between implementation approach and deployment constraints",
        ),
        why_hard: None,
    },
    CaseDef {
        query: "What triggers the GDPR forget-me functionality?",
        expected_answer: "DELETE /api/v2/users/{userId}/forget endpoint, currently in development",
        ground_truth_location: "User-Profile Service - Current Development section",
        difficulty: Difficulty::Medium,
        importance: Importance::High,
        category: "Compliance",
        requires_reasoning: Some("Must understand GDPR context and current development status"),
        why_hard: None,
    },
    CaseDef {
        query: "What's the difference between soft delete and GDPR forget-me for users?",
        expected_answer:
            "Soft delete sets is_active=false but keeps PII; GDPR forget-me scrubs all PII asynchronously",
        ground_truth_location:
            "User-Profile Service - API Endpoints and Current Development sections",
        difficulty: Difficulty::Medium,
        importance: Importance::High,
        category: "Compliance",
        requires_reasoning: Some(
            "Must compare two different deletion approaches across different sections",
        ),
        why_hard: None,
    },
    CaseDef {
        query: "What monitoring issue exists with the Notification-Dispatcher Service?",
        expected_answer:
            "Kafka consumer lag spikes during high traffic and SendGrid rate limit issues",
        ground_truth_location: "Notification-Dispatcher Service - Known Production Issues section",
        difficulty: Difficulty::Medium,
        importance: Importance::High,
        category: "Operations",
        requires_reasoning: None,
        why_hard: None,
    },
    CaseDef {
        query: "What are the data loss risks in the Order-Processor Service?",
        expected_answer:
            "Pod restart during PAYMENT_HALT state causes permanent order loss from local H2 file",
        ground_truth_location:
            "Order-Processor Service - Error Handling section, buried in dense paragraph",
        difficulty: Difficulty::Hard,
        importance: Importance::Critical,
        category: "Risk Management",
        requires_reasoning: Some(
            "Must connect payment errors -> PAYMENT_HALT -> H2 file -> pod restart -> data loss",
        ),
        why_hard: Some(
            "Critical info buried mid-paragraph, requires understanding system state transitions",
        ),
    },
    CaseDef {
        query: "Which parts of the Order-Processor system have no test coverage?",
        expected_answer: "LegacyPaymentFallback class - the deprecated payment fallback mechanism",
        ground_truth_location:
            "Order-Processor Service - Error Handling section, end of paragraph 2",
        difficulty: Difficulty::Hard,
        importance: Importance::Critical,
        category: "Code Quality",
        requires_reasoning: Some("Must find and understand significance of 'no test coverage' mention"),
        why_hard: Some(
            "Mentioned casually at end of complex paragraph with no formatting emphasis",
        ),
    },
    CaseDef {
        query: "What deprecated systems are still running in production?",
        expected_answer:
            "LegacyPaymentFallback class handles payment errors but is marked @Deprecated yet still active",
        ground_truth_location: "Order-Processor Service - Error Handling section",
        difficulty: Difficulty::Hard,
        importance: Importance::High,
        category: "Technical Debt",
        requires_reasoning: Some("Must understand code annotation vs runtime status contradiction"),
        why_hard: Some(
            "Requires connecting '@Deprecated' annotation with 'still active' across complex paragraph",
        ),
    },
    CaseDef {
        query: "What configuration security issue exists in Order-Processor?",
        expected_answer:
            "Redis connection string is hardcoded in RedisConfig.java line 47, needs externalization",
        ground_truth_location: "Order-Processor Service - Configuration section, warning note",
        difficulty: Difficulty::Hard,
        importance: Importance::High,
        category: "Security",
        requires_reasoning: Some("Must recognize hardcoded credentials as security vulnerability"),
        why_hard: Some("Security issue mentioned as side note in configuration section"),
    },
    CaseDef {
        query: "Who left the company and what knowledge was lost?",
        expected_answer: "Original developer of LegacyPaymentFallback is no longer with team, and previous tech lead Mark Johnson left Feb 2023",
        ground_truth_location: "Order-Processor Service - multiple sections",
        difficulty: Difficulty::Hard,
        importance: Importance::High,
        category: "Knowledge Management",
        requires_reasoning: Some(
            "Must connect personnel changes with knowledge gaps and system risks",
        ),
        why_hard: Some(
            "Information scattered across document, requires connecting people with system components",
        ),
    },
    CaseDef {
        query: "What's the cost analysis result for the batching optimization?",
        expected_answer:
            "Savings would be only ~$200/month, so product team deprioritized the feature",
        ground_truth_location: "Notification-Dispatcher Service - Investigation section",
        difficulty: Difficulty::Hard,
        importance: Importance::Medium,
        category: "Business Analysis",
        requires_reasoning: Some(
            "Must connect technical complexity with business value assessment",
        ),
        why_hard: Some("Cost information buried in technical investigation section"),
    },
    CaseDef {
        query: "What blocks the Spring Boot 3.x upgrade for Notification-Dispatcher?",
        expected_answer:
            "Blocked by Java 17→21 upgrade waiting for infrastructure team to update Docker base images",
        ground_truth_location:
            "Notification-Dispatcher Service - Project Backlog, Spring Boot 3.x item",
        difficulty: Difficulty::Hard,
        importance: Importance::Medium,
        category: "Dependencies",
        requires_reasoning: Some(
            "Must trace dependency chain: Spring Boot upgrade → Java upgrade → Infrastructure team → Docker images",
        ),
        why_hard: Some("Dependency chain buried in project planning section"),
    },
];

/// The seventeen built-in cases, in evaluation order.
pub fn default_cases() -> Vec<TestCase> {
    DEFAULT_CASES
        .iter()
        .map(|spec| TestCase {
            query: spec.query.to_string(),
            expected_answer: spec.expected_answer.to_string(),
            ground_truth_location: spec.ground_truth_location.to_string(),
            difficulty: spec.difficulty,
            importance: spec.importance,
            category: spec.category.to_string(),
            requires_reasoning: spec.requires_reasoning.map(str::to_string),
            why_hard: spec.why_hard.map(str::to_string),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stratification() {
        let cases = default_cases();
        assert_eq!(cases.len(), 17);
        let count = |d: Difficulty| cases.iter().filter(|c| c.difficulty == d).count();
        assert_eq!(count(Difficulty::Easy), 5);
        assert_eq!(count(Difficulty::Medium), 5);
        assert_eq!(count(Difficulty::Hard), 7);
    }

    #[test]
    fn test_critical_cases() {
        let critical: Vec<_> = default_cases()
            .into_iter()
            .filter(|c| c.importance == Importance::Critical)
            .map(|c| c.query)
            .collect();
        assert_eq!(critical.len(), 2);
        assert!(critical[0].contains("data loss"));
    }

    #[test]
    fn test_hard_cases_explain_themselves() {
        for case in default_cases()
            .iter()
            .filter(|c| c.difficulty == Difficulty::Hard)
        {
            assert!(case.why_hard.is_some(), "{}", case.query);
            assert!(case.requires_reasoning.is_some(), "{}", case.query);
        }
    }
}
