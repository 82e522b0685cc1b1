//! Integration tests for netns-emulator
//!
//! The lifecycle is exercised against the in-memory backend; the Linux
//! backend runs only with the `sudo-tests` feature.

use netns_emulator::{
    run_session, Backend, Emulation, EmulationError, LinkClass, MemoryBackend, NetOptions, Shell,
};
use topology::presets;

/// Initialize logging for tests
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("netns_emulator=debug")
        .try_init();
}

fn static_arp_options() -> NetOptions {
    NetOptions {
        auto_set_macs: true,
        auto_static_arp: true,
        ..NetOptions::default()
    }
}

#[tokio::test]
async fn test_start_stop_leaves_no_resources() {
    init_logging();

    for preset in presets::all() {
        let topo = preset.build().unwrap();
        let mut emulation = Emulation::new(MemoryBackend::new());
        assert!(emulation.backend().resources().is_empty());

        emulation.start(&topo, &static_arp_options()).await.unwrap();
        let held = emulation.backend().resources();
        assert_eq!(held.namespaces, topo.nodes().len());
        assert_eq!(held.links, topo.links().len());
        assert_eq!(held.shaped_interfaces, topo.links().len() * 2);

        emulation.stop().await.unwrap();
        assert!(
            emulation.backend().resources().is_empty(),
            "{} left resources behind",
            preset.name
        );
    }
}

#[tokio::test]
async fn test_failed_link_rolls_back() {
    init_logging();

    let topo = presets::hub_and_spoke().unwrap();
    let mut emulation = Emulation::new(MemoryBackend::new().with_failing_link(6));

    let err = emulation.start(&topo, &static_arp_options()).await.unwrap_err();
    assert!(matches!(err, EmulationError::Backend(_)));
    assert!(err.to_string().contains("h7-eth0<->s1-eth7"));
    assert!(!emulation.is_running());

    let backend = emulation.into_backend();
    assert!(backend.resources().is_empty());
    assert_eq!(backend.ops().last().map(String::as_str), Some("teardown"));
}

#[tokio::test]
async fn test_failed_node_rolls_back() {
    init_logging();

    let topo = presets::sample().unwrap();
    let mut emulation = Emulation::new(MemoryBackend::new().with_failing_node("s1"));

    assert!(emulation.start(&topo, &NetOptions::default()).await.is_err());
    // No link was attempted
    assert!(!emulation
        .backend()
        .ops()
        .iter()
        .any(|op| op.starts_with("create_link")));
    assert!(emulation.backend().resources().is_empty());
}

#[tokio::test]
async fn test_restart_after_stop() {
    init_logging();

    let topo = presets::sample().unwrap();
    let mut emulation = Emulation::new(MemoryBackend::new());

    emulation.start(&topo, &NetOptions::default()).await.unwrap();
    emulation.stop().await.unwrap();
    assert!(matches!(emulation.stop().await, Err(EmulationError::NotRunning)));

    let plain = NetOptions {
        link_class: LinkClass::Plain,
        ..NetOptions::default()
    };
    emulation.start(&topo, &plain).await.unwrap();
    assert_eq!(emulation.backend().resources().shaped_interfaces, 0);
    emulation.stop().await.unwrap();
}

#[tokio::test]
async fn test_pingall_session_on_sample() {
    init_logging();

    let topo = presets::sample().unwrap();
    let mut emulation = Emulation::new(MemoryBackend::new());
    let mut output = Vec::new();
    let mut shell = Shell::new(&b"nodes\npingall\nexit\n"[..], &mut output);

    run_session(&mut emulation, &topo, &static_arp_options(), &mut shell)
        .await
        .unwrap();
    drop(shell);

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("h1 h2 h3 h4 s1 s2"));
    assert!(text.contains("h4 -> h1 h2 h3"));
    assert!(text.contains("*** Results: 0% dropped (12/12 received)"));
    assert!(emulation.backend().resources().is_empty());
}

#[tokio::test]
#[cfg(feature = "sudo-tests")]
async fn test_netns_backend_sample() -> Result<(), EmulationError> {
    use netns_emulator::{NetnsBackend, NetnsConfig};

    init_logging();

    let topo = presets::sample().unwrap();
    let backend = NetnsBackend::new(NetnsConfig {
        prefix: "tlint-".to_string(),
        ..NetnsConfig::default()
    })
    .await?;
    let mut emulation = Emulation::new(backend);

    emulation.start(&topo, &static_arp_options()).await?;
    assert_eq!(emulation.backend().resources().namespaces, 6);

    let out = emulation.exec("h1", "ping -c1 -W2 10.0.0.4").await?;
    assert!(out.success(), "ping failed: {}", out.stdout);

    let out = emulation.exec("h1", "tc qdisc show dev h1-eth0").await?;
    assert!(out.stdout.contains("netem"));

    emulation.stop().await?;
    assert!(emulation.backend().resources().is_empty());
    Ok(())
}
