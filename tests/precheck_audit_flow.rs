//! End-to-end pre-check and audit flows through the governance engine.

use llm_governance_gateway::audit::{JsonlAuditStore, MemoryAuditStore};
use llm_governance_gateway::policy::TenantRules;
use llm_governance_gateway::{
    AuditQuery, AuditRequest, CallReport, Category, Config, Error, ErrorBody, GovernanceEngine,
    PreCheckRequest, RuleAction, RuleSet, TokenUsage,
};

use std::sync::Arc;
use std::time::Duration;

async fn engine_with(rules: RuleSet, config: Config) -> Arc<GovernanceEngine> {
    let engine = GovernanceEngine::builder()
        .with_config(config)
        .with_rules(rules)
        .with_audit_store(Arc::new(MemoryAuditStore::new()))
        .build()
        .await
        .unwrap();
    Arc::new(engine)
}

async fn default_engine() -> Arc<GovernanceEngine> {
    engine_with(RuleSet::default(), Config::default()).await
}

fn paris_report() -> CallReport {
    CallReport::new(
        "Paris is the capital.",
        "openai",
        "gpt-3.5-turbo",
        TokenUsage::new(20, 30),
        420,
    )
}

#[tokio::test]
async fn clean_query_is_approved_and_audited() {
    let engine = default_engine().await;

    let precheck = engine
        .pre_check(&PreCheckRequest::new("support-bot", "What is the capital of France?"))
        .unwrap();
    assert!(precheck.approved);
    assert!(precheck.findings.is_empty());
    assert!(precheck.matched_policies.is_empty());

    let audit = engine
        .record_audit(AuditRequest::new(&precheck.correlation_id, paris_report()))
        .await
        .unwrap();
    assert!(!audit.audit_id.is_empty());

    let records = engine
        .audit_records(&AuditQuery::tenant("default"))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.correlation_id, precheck.correlation_id);
    assert_eq!(record.usage.total_tokens, 50);
    assert_eq!(record.response_summary, "Paris is the capital.");
}

#[tokio::test]
async fn ssn_blocked_under_default_rules() {
    let engine = default_engine().await;

    let precheck = engine
        .pre_check(&PreCheckRequest::new(
            "support-bot",
            "Process refund for customer with SSN 123-45-6789",
        ))
        .unwrap();

    assert!(!precheck.approved);
    assert!(precheck
        .findings
        .iter()
        .any(|f| f.category == Category::SocialSecurityNumber));
    assert!(precheck
        .block_reason
        .unwrap()
        .contains("social-security-number"));
}

#[tokio::test]
async fn credit_card_blocked_and_named() {
    let rules = RuleSet::new()
        .with_default_action(RuleAction::Ignore)
        .with_rule(Category::CreditCardNumber, RuleAction::Block);
    let engine = engine_with(rules, Config::default()).await;

    for card in ["4111 1111 1111 1111", "5500-0055-5555-5559", "378282246310005"] {
        let precheck = engine
            .pre_check(&PreCheckRequest::new("checkout", format!("charge card {} now", card)))
            .unwrap();
        assert!(!precheck.approved, "{} should block", card);
        assert!(precheck
            .block_reason
            .as_deref()
            .unwrap()
            .contains("credit-card-number"));
    }

    let luhn_invalid = engine
        .pre_check(&PreCheckRequest::new("checkout", "charge card 4111 1111 1111 1112 now"))
        .unwrap();
    assert!(luhn_invalid.approved);
}

#[tokio::test]
async fn blocked_context_cannot_be_audited() {
    let engine = default_engine().await;
    let precheck = engine
        .pre_check(&PreCheckRequest::new("u", "card 4111111111111111"))
        .unwrap();
    assert!(!precheck.approved);

    let mut report = paris_report();
    report.response_summary = String::new();
    let err = engine
        .record_audit(AuditRequest::new(&precheck.correlation_id, report))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BlockedContextAudit { .. }));

    let err = engine
        .record_audit(AuditRequest::new(&precheck.correlation_id, paris_report()))
        .await
        .unwrap_err();
    assert!(err.is_audit_rejection());
}

#[tokio::test]
async fn malformed_token_usage_rejected_before_persistence() {
    let engine = default_engine().await;
    let precheck = engine
        .pre_check(&PreCheckRequest::new("u", "What is the capital of France?"))
        .unwrap();

    let mut report = paris_report();
    report.usage = TokenUsage {
        prompt_tokens: 20,
        completion_tokens: 30,
        total_tokens: 99,
    };
    let err = engine
        .record_audit(AuditRequest::new(&precheck.correlation_id, report))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert_eq!(err.wire_code(), "invalid_request");

    let records = engine
        .audit_records(&AuditQuery::tenant("default"))
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn concurrent_audits_have_exactly_one_winner() {
    let engine = default_engine().await;
    let precheck = engine
        .pre_check(&PreCheckRequest::new("u", "What is the capital of France?"))
        .unwrap();

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let id = precheck.correlation_id.clone();
            tokio::spawn(async move { engine.record_audit(AuditRequest::new(id, paris_report())).await })
        })
        .collect();

    let mut successes = 0;
    let mut already_consumed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(Error::ContextAlreadyConsumed { .. }) => already_consumed += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(already_consumed, 31);
}

#[tokio::test]
async fn expired_and_unknown_share_wire_code() {
    let mut config = Config::default();
    config.context.ttl_secs = 1;
    let engine = engine_with(RuleSet::default(), config).await;

    let precheck = engine
        .pre_check(&PreCheckRequest::new("u", "What is the capital of France?"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let expired = engine
        .record_audit(AuditRequest::new(&precheck.correlation_id, paris_report()))
        .await
        .unwrap_err();
    let unknown = engine
        .record_audit(AuditRequest::new("0123456789abcdef0123456789abcdef", paris_report()))
        .await
        .unwrap_err();

    assert!(matches!(expired, Error::ContextExpired { .. }));
    assert!(matches!(unknown, Error::ContextNotFound { .. }));
    assert_eq!(ErrorBody::from(&expired), ErrorBody::from(&unknown));

    engine.sweep_expired();
    let swept = engine
        .record_audit(AuditRequest::new(&precheck.correlation_id, paris_report()))
        .await
        .unwrap_err();
    assert!(matches!(swept, Error::ContextNotFound { .. }));
}

#[tokio::test]
async fn audit_from_another_tenant_is_not_found() {
    let rules = RuleSet::new().with_tenant(TenantRules::new("acme").with_default_action(RuleAction::Warn));
    let engine = engine_with(rules, Config::default()).await;

    let precheck = engine
        .pre_check(&PreCheckRequest::new("alice", "mail bob@example.com").with_tenant("acme"))
        .unwrap();
    assert!(precheck.approved);
    assert_eq!(precheck.matched_policies, vec!["email-address".to_string()]);

    let err = engine
        .record_audit(AuditRequest::new(&precheck.correlation_id, paris_report()).claiming("globex", "alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ContextNotFound { .. }));

    let audit = engine
        .record_audit(AuditRequest::new(&precheck.correlation_id, paris_report()).claiming("acme", "alice"))
        .await
        .unwrap();
    assert!(audit.success);

    let acme = engine.audit_records(&AuditQuery::tenant("acme")).await.unwrap();
    assert_eq!(acme.len(), 1);
    assert_eq!(acme[0].matched_policies, vec!["email-address".to_string()]);
    assert!(engine
        .audit_records(&AuditQuery::tenant("globex"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn jsonl_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");

    let first = GovernanceEngine::builder()
        .with_audit_store(Arc::new(JsonlAuditStore::open(&path).await.unwrap()))
        .build()
        .await
        .unwrap();
    let precheck = first
        .pre_check(&PreCheckRequest::new("u", "What is the capital of France?"))
        .unwrap();
    first
        .record_audit(AuditRequest::new(&precheck.correlation_id, paris_report()))
        .await
        .unwrap();
    drop(first);

    let second = GovernanceEngine::builder()
        .with_audit_store(Arc::new(JsonlAuditStore::open(&path).await.unwrap()))
        .build()
        .await
        .unwrap();
    let records = second
        .audit_records(&AuditQuery::tenant("default"))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].correlation_id, precheck.correlation_id);
}
