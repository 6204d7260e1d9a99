mod common;

use common::{Harness, Script};
use std::time::Duration;
use url::Url;

use h2sampler::fanout::extract_resource_urls;
use h2sampler::{ClientConfig, ClientTimeouts, FanoutConfig, ResourceFanout, SampleResult};

fn parent_page(body: &str) -> SampleResult {
    let mut parent = SampleResult::new("page", "GET");
    parent.url = Some(Url::parse("http://localhost:8080/page").unwrap());
    parent.body = bytes::Bytes::copy_from_slice(body.as_bytes());
    parent.response_code = "200".to_string();
    parent.successful = true;
    parent
}

#[test]
fn extracts_src_and_href_attributes() {
    let base = Url::parse("http://localhost:8080/page").unwrap();
    let urls = extract_resource_urls(
        &base,
        r#"<link href="/style.css"><img src='logo.png'><script src="http://cdn.example/app.js">"#,
    );
    let text: Vec<&str> = urls.iter().map(|u| u.as_str()).collect();
    assert_eq!(
        text,
        vec![
            "http://localhost:8080/style.css",
            "http://localhost:8080/logo.png",
            "http://cdn.example/app.js",
        ]
    );
}

#[test]
fn allow_pattern_filters_out_non_matching_resources() {
    let harness = Harness::new();
    let mut ctx = harness.context();

    let fanout = ResourceFanout::new(&FanoutConfig {
        allow_pattern: ".+css".to_string(),
        ..FanoutConfig::default()
    });
    let mut parent = parent_page(r#"<img src="http://localhost:8080/logo.png">"#);
    fanout.download_embedded(&mut parent, &mut ctx);

    assert!(parent.sub_results.is_empty());
    assert_eq!(harness.transport.request_count(), 0);
}

#[test]
fn deny_pattern_excludes_matching_resources() {
    let fanout = ResourceFanout::new(&FanoutConfig {
        deny_pattern: r"\.png$".to_string(),
        ..FanoutConfig::default()
    });
    assert!(!fanout.accepts(&Url::parse("http://h/logo.png").unwrap()));
    assert!(fanout.accepts(&Url::parse("http://h/style.css").unwrap()));
}

#[test]
fn malformed_patterns_fail_open_for_allow_and_inert_for_deny() {
    let broken_allow = ResourceFanout::new(&FanoutConfig {
        allow_pattern: "[".to_string(),
        ..FanoutConfig::default()
    });
    assert!(broken_allow.accepts(&Url::parse("http://h/anything").unwrap()));

    let broken_deny = ResourceFanout::new(&FanoutConfig {
        deny_pattern: "[".to_string(),
        ..FanoutConfig::default()
    });
    assert!(broken_deny.accepts(&Url::parse("http://h/anything").unwrap()));
}

#[test]
fn serial_download_aggregates_success_as_and() {
    let harness = Harness::new();
    harness.transport.route("/style.css", Script::ok("css"));
    harness.transport.route("/app.js", Script::status(500));
    let mut ctx = harness.context();

    let fanout = ResourceFanout::new(&FanoutConfig::default()).serial_delay(Duration::ZERO);
    let mut parent = parent_page(r#"<link href="/style.css"><script src="/app.js">"#);
    fanout.download_embedded(&mut parent, &mut ctx);

    assert_eq!(parent.sub_results.len(), 2);
    assert_eq!(parent.sub_results[0].response_code, "200");
    assert_eq!(parent.sub_results[1].response_code, "500");
    assert!(!parent.successful, "failed sub-result fails the parent");
}

#[test]
fn embedded_failures_can_be_ignored() {
    let harness = Harness::new();
    harness.transport.route("/style.css", Script::status(500));
    let mut ctx = harness.context();

    let fanout = ResourceFanout::new(&FanoutConfig {
        ignore_embedded_failures: true,
        ..FanoutConfig::default()
    })
    .serial_delay(Duration::ZERO);
    let mut parent = parent_page(r#"<link href="/style.css">"#);
    fanout.download_embedded(&mut parent, &mut ctx);

    assert_eq!(parent.sub_results.len(), 1);
    assert!(!parent.sub_results[0].successful);
    assert!(parent.successful, "parent success untouched");
}

#[test]
fn serial_failures_do_not_abort_remaining_downloads() {
    let harness = Harness::new();
    harness.transport.route(
        "/broken.css",
        Script::Fail {
            message: "connection reset".to_string(),
            partial: None,
        },
    );
    harness.transport.route("/app.js", Script::ok("js"));
    let mut ctx = harness.context();

    let fanout = ResourceFanout::new(&FanoutConfig::default()).serial_delay(Duration::ZERO);
    let mut parent = parent_page(r#"<link href="/broken.css"><script src="/app.js">"#);
    fanout.download_embedded(&mut parent, &mut ctx);

    assert_eq!(parent.sub_results.len(), 2);
    assert!(!parent.sub_results[0].successful);
    assert!(parent.sub_results[1].successful);
}

#[test]
fn concurrent_deadline_appends_one_synthetic_timeout_result() {
    let harness = Harness::new();
    for path in ["/r1", "/r2", "/r3", "/r4"] {
        harness.transport.route(path, Script::ok("ok"));
    }
    harness.transport.route("/r5", Script::Hang);
    // Per-request timeouts disabled so only the fan-out deadline bounds
    // the wait.
    let mut ctx = harness.context_with(ClientConfig {
        timeouts: ClientTimeouts::disabled(),
        ..ClientConfig::default()
    });

    let fanout = ResourceFanout::new(&FanoutConfig {
        pool_size: 5,
        ..FanoutConfig::default()
    })
    .deadline(Duration::from_millis(1000));

    let urls: Vec<Url> = (1..=5)
        .map(|i| Url::parse(&format!("http://localhost:8080/r{}", i)).unwrap())
        .collect();
    let mut parent = parent_page("");
    let started = std::time::Instant::now();
    fanout.download(&mut parent, urls, &mut ctx);
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(1000));
    assert!(elapsed < Duration::from_millis(2500), "waiting stopped at the deadline");
    assert_eq!(parent.sub_results.len(), 5);

    let timeouts: Vec<&SampleResult> = parent
        .sub_results
        .iter()
        .filter(|sub| sub.response_code == "Execution Timeout")
        .collect();
    assert_eq!(timeouts.len(), 1, "exactly one synthetic timeout result");

    let finished = parent
        .sub_results
        .iter()
        .filter(|sub| sub.successful)
        .count();
    assert_eq!(finished, 4, "completed downloads are all present");
}

#[test]
fn concurrent_mode_with_pool_size_one_degrades_to_serial() {
    let harness = Harness::new();
    harness.transport.route("/only.css", Script::ok("css"));
    let mut ctx = harness.context();

    let fanout = ResourceFanout::new(&FanoutConfig {
        pool_size: 1,
        ..FanoutConfig::default()
    });
    let mut parent = parent_page(r#"<link href="/only.css">"#);
    fanout.download_embedded(&mut parent, &mut ctx);

    assert_eq!(parent.sub_results.len(), 1);
    assert!(parent.sub_results[0].successful);
}
