mod common;

use common::{ScriptedBackend, open_session};
use std::time::Duration;
use url::Url;
use waypoint_engine::backend::ActionKind;
use waypoint_engine::error::JourneyError;
use waypoint_engine::executor::{ExecutorOptions, StepExecutor, StepStatus};
use waypoint_engine::journey::{Check, Fixtures, Predicate, Settle, Step};
use waypoint_engine::locator::Locator;

fn executor() -> StepExecutor {
    StepExecutor::new(ExecutorOptions {
        poll_interval: Duration::from_millis(50),
        settle_timeout: Duration::from_millis(200),
        ..ExecutorOptions::default()
    })
}

fn executor_with(fixtures: Fixtures, base_url: Option<&str>) -> StepExecutor {
    StepExecutor::new(ExecutorOptions {
        base_url: base_url.map(|u| Url::parse(u).unwrap()),
        fixtures,
        poll_interval: Duration::from_millis(50),
        settle_timeout: Duration::from_millis(200),
    })
}

#[tokio::test(start_paused = true)]
async fn test_fill_with_submit_presses_key_after_filling() {
    let backend = ScriptedBackend::new().with_element("#search", "search-box");
    let journal = backend.journal();
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let step = Step::fill("search", [Locator::css("#search")], "earbuds").submit_with("Enter");
    let result = executor().execute(&mut session, &step).await;

    assert_eq!(result.status, StepStatus::Succeeded);
    assert_eq!(result.captured.as_deref(), Some("earbuds"));
    assert_eq!(result.settled, Some(true));
    {
        let journal = journal.lock().unwrap();
        let actions: Vec<_> = journal
            .actions
            .iter()
            .map(|a| (a.kind, a.payload.clone()))
            .collect();
        assert_eq!(
            actions,
            vec![
                (ActionKind::Fill, Some("earbuds".to_string())),
                (ActionKind::Press, Some("Enter".to_string())),
            ]
        );
    }
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_tolerated_missing_target_is_skipped() {
    let backend = ScriptedBackend::new();
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let step = Step::click("store-pickup", [Locator::text("In-Store Pickup")]).tolerated();
    let result = executor().execute(&mut session, &step).await;

    assert_eq!(result.status, StepStatus::SkippedNotFound);
    assert_eq!(
        result.failure,
        Some(JourneyError::ElementNotFound {
            step: "store-pickup".into(),
            attempted: vec!["text=In-Store Pickup".into()],
        })
    );
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_fatal_missing_target_fails_with_element_not_found() {
    let backend = ScriptedBackend::new();
    let journal = backend.journal();
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let step = Step::click("checkout", [Locator::css("#checkout"), Locator::text("Checkout")])
        .with_timeout(Duration::from_millis(400));
    let result = executor().execute(&mut session, &step).await;

    assert_eq!(result.status, StepStatus::FailedFatal);
    match result.failure {
        Some(JourneyError::ElementNotFound { step, attempted }) => {
            assert_eq!(step, "checkout");
            assert_eq!(attempted, vec!["#checkout", "text=Checkout"]);
        }
        other => panic!("unexpected failure {:?}", other),
    }
    assert_eq!(result.elapsed_ms, 400);
    assert!(journal.lock().unwrap().actions.is_empty());
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_action_error_is_fatal_even_when_tolerated() {
    let backend = ScriptedBackend::new()
        .with_element("#promo-apply", "promo-apply")
        .failing_act("promo-apply");
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let step = Step::click("apply-promo", [Locator::css("#promo-apply")]).tolerated();
    let result = executor().execute(&mut session, &step).await;

    assert_eq!(result.status, StepStatus::FailedFatal);
    assert!(matches!(
        result.failure,
        Some(JourneyError::ActionFailed { ref step, .. }) if step == "apply-promo"
    ));
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_settle_timeout_does_not_fail_step() {
    let backend = ScriptedBackend::new()
        .with_element("#add", "add-to-cart")
        .busy_network();
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let step = Step::click("add-to-cart", [Locator::css("#add")]);
    let result = executor().execute(&mut session, &step).await;

    assert_eq!(result.status, StepStatus::Succeeded);
    assert_eq!(result.settled, Some(false));
    assert_eq!(result.elapsed_ms, 200, "settle is bounded by the settle timeout");
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_element_settle_waits_for_follow_up() {
    let backend = ScriptedBackend::new()
        .with_element("#add", "add-to-cart")
        .appearing_after("#cart-count", "cart-count", 2);
    let journal = backend.journal();
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let step = Step::click("add-to-cart", [Locator::css("#add")])
        .with_settle(Settle::element([Locator::css("#cart-count")]));
    let result = executor().execute(&mut session, &step).await;

    assert_eq!(result.status, StepStatus::Succeeded);
    assert_eq!(result.settled, Some(true));
    assert_eq!(result.elapsed_ms, 100);
    assert_eq!(journal.lock().unwrap().network_waits, 0);
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_select_filter_on_expanded_panel_skips_expansion() {
    let backend = ScriptedBackend::new().with_element("text=JBL", "jbl-option");
    let journal = backend.journal();
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let result = executor()
        .execute(&mut session, &Step::select_filter("Brand", "JBL"))
        .await;

    assert_eq!(result.name, "filter-brand");
    assert_eq!(result.status, StepStatus::Succeeded);
    let subs: Vec<_> = result
        .sub_results
        .iter()
        .map(|r| (r.name.as_str(), r.status))
        .collect();
    assert_eq!(
        subs,
        vec![
            ("expand-brand", StepStatus::SkippedNotFound),
            ("select-jbl", StepStatus::Succeeded),
        ]
    );
    assert_eq!(journal.lock().unwrap().acted_on(), vec!["jbl-option"]);
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_select_filter_expands_then_selects() {
    let backend = ScriptedBackend::new()
        .with_element("button:has-text('Color')", "color-toggle")
        .with_element("label:has-text('Black')", "black-label");
    let journal = backend.journal();
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let result = executor()
        .execute(&mut session, &Step::select_filter("Color", "Black"))
        .await;

    assert_eq!(result.status, StepStatus::Succeeded);
    assert_eq!(
        journal.lock().unwrap().acted_on(),
        vec!["color-toggle", "black-label"]
    );
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_select_filter_missing_option_is_fatal() {
    let backend = ScriptedBackend::new().with_element("text=Price", "price-toggle");
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let result = executor()
        .execute(&mut session, &Step::select_filter("Price", "Over $50"))
        .await;

    assert_eq!(result.status, StepStatus::FailedFatal);
    assert!(matches!(
        result.failure,
        Some(JourneyError::ElementNotFound { ref step, .. }) if step == "select-over-50"
    ));
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_group_of_skipped_steps_is_skipped() {
    let backend = ScriptedBackend::new();
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let group = Step::group(
        "dismiss-banners",
        vec![
            Step::click("cookies", [Locator::css("#accept-cookies")]).tolerated(),
            Step::click("newsletter", [Locator::css("#close-newsletter")]).tolerated(),
        ],
    );
    let result = executor().execute(&mut session, &group).await;

    assert_eq!(result.status, StepStatus::SkippedNotFound);
    assert_eq!(result.sub_results.len(), 2);
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_tolerated_group_downgrades_missing_element() {
    let backend = ScriptedBackend::new().with_element("#promo", "promo-input");
    let journal = backend.journal();
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let group = Step::group(
        "promo-code",
        vec![
            Step::fill("enter-promo", [Locator::css("#promo")], "TEST"),
            Step::click("apply-promo", [Locator::text("Apply")]),
            Step::click("confirm-promo", [Locator::css("#confirm")]),
        ],
    )
    .tolerated();
    let result = executor().execute(&mut session, &group).await;

    assert_eq!(result.status, StepStatus::SkippedNotFound);
    assert_eq!(result.sub_results.len(), 2, "group halts at its first fatal sub-step");
    assert_eq!(journal.lock().unwrap().acted_on(), vec!["promo-input"]);
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_group_timeout_bounds_its_sub_steps() {
    let backend = ScriptedBackend::new();
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let group = Step::group(
        "promo-code",
        vec![Step::fill("enter-promo", [Locator::css("#promo")], "TEST")],
    )
    .tolerated()
    .with_timeout(Duration::from_millis(50));
    let result = executor().execute(&mut session, &group).await;

    assert_eq!(result.status, StepStatus::SkippedNotFound);
    assert!(
        result.elapsed_ms <= 60,
        "group bound of 50ms, session default of 300ms; took {}ms",
        result.elapsed_ms
    );
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_navigate_joins_relative_url_to_base() {
    let backend = ScriptedBackend::new();
    let journal = backend.journal();
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let result = executor_with(Fixtures::new(), Some("https://shop.example/store/"))
        .execute(&mut session, &Step::navigate("open-cart", "cart?view=full"))
        .await;

    assert_eq!(result.status, StepStatus::Succeeded);
    assert_eq!(
        result.captured.as_deref(),
        Some("https://shop.example/store/cart?view=full")
    );
    assert_eq!(
        journal.lock().unwrap().navigations,
        vec!["https://shop.example/store/cart?view=full"]
    );
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_relative_navigation_without_base_fails() {
    let backend = ScriptedBackend::new();
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let result = executor()
        .execute(&mut session, &Step::navigate("open-cart", "/cart"))
        .await;

    assert_eq!(result.status, StepStatus::FailedFatal);
    assert!(matches!(result.failure, Some(JourneyError::ActionFailed { .. })));
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_fixtures_are_rendered_into_locators_and_values() {
    let backend = ScriptedBackend::new()
        .with_element("a:has-text('JBL Quantum True Wireless')", "product-link")
        .with_element("input[name='email']", "email");
    let journal = backend.journal();
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let fixtures: Fixtures = [
        ("product", "JBL Quantum True Wireless"),
        ("email", "shopper@example.com"),
    ]
    .into_iter()
    .collect();
    let executor = executor_with(fixtures, None);

    let open = Step::click("open-product", [Locator::has_text("a", "{{product}}")]);
    let fill = Step::fill("email", [Locator::css("input[name='email']")], "{{email}}");
    assert_eq!(
        executor.execute(&mut session, &open).await.status,
        StepStatus::Succeeded
    );
    let filled = executor.execute(&mut session, &fill).await;
    assert_eq!(filled.captured.as_deref(), Some("shopper@example.com"));

    let journal = journal.lock().unwrap();
    assert_eq!(journal.acted_on(), vec!["product-link", "email"]);
    drop(journal);
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_required_check_fails_checkpoint() {
    let backend = ScriptedBackend::new().with_text("h1", "title", "Shopping Cart");
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let checkpoint = Step::checkpoint(
        "cart-page",
        vec![
            Check::new(
                "heading",
                Predicate::TextMatches {
                    locators: vec![Locator::css("h1")],
                    pattern: "(?i)cart".into(),
                },
            )
            .required(),
            Check::new(
                "subtotal",
                Predicate::Visible {
                    locators: vec![Locator::css(".subtotal")],
                },
            )
            .required(),
        ],
    )
    .with_timeout(Duration::from_millis(200));
    let result = executor().execute(&mut session, &checkpoint).await;

    assert_eq!(result.status, StepStatus::FailedFatal);
    assert_eq!(result.assertions.len(), 2);
    assert!(result.assertions[0].passed());
    assert!(matches!(
        result.failure,
        Some(JourneyError::AssertionFailed { ref check, .. }) if check == "subtotal"
    ));
    manager.close(session).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_optional_check_failure_is_only_recorded() {
    let backend = ScriptedBackend::new();
    let dir = tempfile::tempdir().unwrap();
    let (manager, mut session) = open_session(&backend, dir.path()).await;

    let optional = Step::checkpoint(
        "tax",
        vec![Check::new(
            "tax-line",
            Predicate::Visible {
                locators: vec![Locator::css(".tax")],
            },
        )],
    )
    .with_timeout(Duration::from_millis(100));
    let tolerated = Step::checkpoint(
        "pickup",
        vec![
            Check::new(
                "pickup-panel",
                Predicate::Visible {
                    locators: vec![Locator::css(".pickup")],
                },
            )
            .required(),
        ],
    )
    .tolerated()
    .with_timeout(Duration::from_millis(100));

    let executor = executor();
    for step in [optional, tolerated] {
        let result = executor.execute(&mut session, &step).await;
        assert_eq!(result.status, StepStatus::Succeeded, "step {}", step.name);
        assert_eq!(result.assertions.len(), 1);
        assert!(!result.assertions[0].passed());
        assert!(result.failure.is_none());
    }
    manager.close(session).await.unwrap();
}
