mod common;

use common::ScriptedBackend;
use std::time::Duration;
use waypoint_engine::assertion::{AssertionLayer, AssertionResult};
use waypoint_engine::journey::{Check, Fixtures, Predicate};
use waypoint_engine::locator::Locator;
use waypoint_engine::resolution::LocatorResolver;

fn layer() -> AssertionLayer {
    AssertionLayer::new(LocatorResolver::new(Duration::from_millis(50)))
}

fn cart_page() -> ScriptedBackend {
    ScriptedBackend::new()
        .with_page("https://shop.example/cart", "Your Shopping Cart")
        .with_text("h1", "heading", "JBL Quantum True Wireless")
        .with_text(".price", "price", "$79.99")
        .with_count(".cart-item", 1)
}

#[tokio::test(start_paused = true)]
async fn test_visible_predicate() {
    let mut backend = cart_page();
    let timeout = Duration::from_millis(200);

    let pass = layer()
        .check(
            &mut backend,
            &Predicate::Visible {
                locators: vec![Locator::css("#missing"), Locator::css("h1")],
            },
            timeout,
        )
        .await;
    assert_eq!(pass, AssertionResult::Pass);

    let fail = layer()
        .check(
            &mut backend,
            &Predicate::Visible {
                locators: vec![Locator::css(".tax")],
            },
            timeout,
        )
        .await;
    match fail {
        AssertionResult::Fail(detail) => assert!(detail.contains(".tax"), "{}", detail),
        AssertionResult::Pass => panic!("tax line is not on the page"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_text_matches_predicate() {
    let mut backend = cart_page();
    let timeout = Duration::from_millis(200);

    let matches = Predicate::TextMatches {
        locators: vec![Locator::css("h1")],
        pattern: "Quantum.*Wireless".into(),
    };
    assert!(layer().check(&mut backend, &matches, timeout).await.is_pass());

    let mismatch = Predicate::TextMatches {
        locators: vec![Locator::css(".price")],
        pattern: r"^\$1\d\d".into(),
    };
    match layer().check(&mut backend, &mismatch, timeout).await {
        AssertionResult::Fail(detail) => assert!(detail.contains("$79.99"), "{}", detail),
        AssertionResult::Pass => panic!("price should not match"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_page_level_predicates() {
    let mut backend = cart_page();
    let timeout = Duration::from_millis(100);
    let layer = layer();

    let cases = [
        (
            Predicate::UrlContains {
                fragment: "/cart".into(),
            },
            true,
        ),
        (
            Predicate::UrlContains {
                fragment: "/checkout".into(),
            },
            false,
        ),
        (
            Predicate::TitleMatches {
                pattern: "(?i)shopping cart".into(),
            },
            true,
        ),
        (
            Predicate::CountAtLeast {
                locator: Locator::css(".cart-item"),
                min: 1,
            },
            true,
        ),
        (
            Predicate::CountAtLeast {
                locator: Locator::css(".cart-item"),
                min: 2,
            },
            false,
        ),
    ];

    for (predicate, expected) in cases {
        let result = layer.check(&mut backend, &predicate, timeout).await;
        assert_eq!(result.is_pass(), expected, "{:?} -> {:?}", predicate, result);
    }
}

#[tokio::test(start_paused = true)]
async fn test_invalid_pattern_fails_check() {
    let mut backend = cart_page();
    let result = layer()
        .check(
            &mut backend,
            &Predicate::TitleMatches {
                pattern: "(unclosed".into(),
            },
            Duration::from_millis(100),
        )
        .await;
    assert!(matches!(result, AssertionResult::Fail(ref d) if d.contains("invalid pattern")));
}

#[tokio::test(start_paused = true)]
async fn test_evaluate_renders_fixture_values_literally() {
    let mut backend = cart_page();
    let fixtures: Fixtures = [("price", "$79.99")].into_iter().collect();
    let check = Check::new(
        "price",
        Predicate::TextMatches {
            locators: vec![Locator::css(".price")],
            pattern: "^{{price}}$".into(),
        },
    )
    .required();

    let record = layer()
        .evaluate(&mut backend, &check, &fixtures, Duration::from_millis(100))
        .await;

    assert!(record.passed(), "{:?}", record);
    assert!(record.required);
    assert_eq!(record.check, "price");
    assert_eq!(record.observed.as_deref(), Some("$79.99"));
}

#[tokio::test(start_paused = true)]
async fn test_evaluate_unknown_fixture_fails() {
    let mut backend = cart_page();
    let check = Check::new(
        "total",
        Predicate::UrlContains {
            fragment: "{{missing}}".into(),
        },
    );

    let record = layer()
        .evaluate(
            &mut backend,
            &check,
            &Fixtures::new(),
            Duration::from_millis(100),
        )
        .await;

    assert!(!record.passed());
    assert!(record.failure_detail().unwrap().contains("missing"));
}

#[test]
fn test_record_serializes_flat() {
    let record = waypoint_engine::assertion::AssertionRecord {
        check: "heading".into(),
        required: true,
        result: AssertionResult::Fail("no element".into()),
        observed: None,
    };
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["check"], "heading");
    assert_eq!(json["result"], "fail");
    assert_eq!(json["detail"], "no element");
}
