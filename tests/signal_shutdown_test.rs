//! Termination signals stop the pipeline like the `stop` query.
//!
//! Own test binary: the signal is sent to this whole process.
#![cfg(unix)]

use light_sampler::app::LightSampler;
use light_sampler::config::SamplerConfig;
use light_sampler::hardware::{RecordingOutput, ScriptedSource};
use light_sampler::reporter::SharedBuffer;
use light_sampler::shutdown::Shutdown;
use std::process::Command;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn test_sigterm_shuts_down_cleanly() {
    let mut config = SamplerConfig::default();
    config.server.bind_addr = [127, 0, 0, 1].into();
    config.server.port = 0;
    config.reporter.period_ms = 100;

    let source = ScriptedSource::new(std::iter::repeat(1.0).take(1_000_000));
    let released = source.release_flag();
    let sink = SharedBuffer::new();

    let app = LightSampler::start(
        &config,
        Box::new(source),
        Box::new(RecordingOutput::new()),
        Box::new(sink.clone()),
        Shutdown::new(),
    )
    .await
    .expect("Failed to start");
    let watcher = app.shutdown_handle().watch_signals().unwrap();
    let running = tokio::spawn(app.run_until_shutdown());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let status = Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .expect("run kill");
    assert!(status.success());

    let summary = timeout(Duration::from_secs(2), running)
        .await
        .expect("Shutdown took too long")
        .unwrap()
        .expect("Shutdown failed");
    watcher.await.unwrap();

    assert!(released.load(Ordering::SeqCst), "voltage source not released");
    assert!(summary.reports >= 1);
    assert!(sink.contents().contains("#Smpl/s"));
}
