use std::{
    f32::consts::PI,
    io::Cursor,
    sync::{Arc, Mutex},
    time::Duration,
};

use music_pulse_core::{
    lock_renderer, AnimationScheduler, AudioConfig, AudioSessionManager, CoverSlot, DisplayList,
    FileTrackFetcher, NullOutput, Particle, PlaybackOutcome, PulseError, RenderConfig,
    SessionState, SymphoniaDecoder, VisualizationMode, VisualizationRenderer, VisualizationState,
};
use tempfile::TempDir;

const SAMPLE_RATE: u32 = 8_000;

fn tone_wav(frequency: f32, seconds: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut raw = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut raw), spec).unwrap();
        let frames = (SAMPLE_RATE as f32 * seconds) as usize;
        for n in 0..frames {
            let t = n as f32 / SAMPLE_RATE as f32;
            let sample = 0.5 * (2.0 * PI * frequency * t).sin();
            writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    raw
}

fn media_dir(files: &[(&str, &[u8])]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }
    dir
}

fn manager_for(dir: &TempDir, cover: Arc<CoverSlot>) -> AudioSessionManager {
    AudioSessionManager::new(
        Arc::new(FileTrackFetcher::new(dir.path())),
        Arc::new(SymphoniaDecoder::new()),
        cover,
        Arc::new(NullOutput),
        audio_config(),
    )
}

fn audio_config() -> AudioConfig {
    AudioConfig {
        bin_count: 64,
        block_size: 256,
        ..Default::default()
    }
}

#[tokio::test]
async fn decoded_track_drives_the_visualisation() {
    let tone = tone_wav(1_000.0, 2.0);
    let dir = media_dir(&[("tone.mp3", tone.as_slice())]);

    let cover = Arc::new(CoverSlot::new());
    let manager = manager_for(&dir, cover.clone());
    let analyzer = manager.build_graph(0.5).unwrap().analyzer().clone();

    let renderer = Arc::new(Mutex::new(VisualizationRenderer::new(
        DisplayList::new(),
        RenderConfig {
            mode: VisualizationMode::Column,
            ..Default::default()
        },
        analyzer.bin_count(),
    )));
    let mut scheduler = AnimationScheduler::new(analyzer, renderer.clone(), 60);

    let outcome = manager.request_playback("tone").await.unwrap();
    assert_eq!(outcome, PlaybackOutcome::Started("tone".to_string()));
    assert_eq!(manager.state(), SessionState::Playing);
    assert!(!cover.is_visible());

    tokio::time::sleep(Duration::from_millis(250)).await;
    let frame = scheduler.tick().unwrap();

    assert_eq!(frame.len(), 64);
    assert!(frame.bins()[16] > 100, "tone bin too quiet: {:?}", frame.bins());
    assert!(frame.bins()[16] > frame.bins()[50]);

    {
        let renderer = lock_renderer(&renderer).unwrap();
        match renderer.state() {
            VisualizationState::Column(columns) => assert!(columns.caps()[16] > 0.0),
            other => panic!("unexpected state {other:?}"),
        }
    }

    manager.set_volume(0.3);
    assert_eq!(manager.volume(), Some(0.3));

    let err = manager.request_playback("missing").await.unwrap_err();
    assert!(matches!(err, PulseError::Fetch { .. }));
    assert_eq!(manager.state(), SessionState::Failed);
    assert_eq!(manager.graph().unwrap().connected_sources(), 0);
}

#[tokio::test]
async fn garbage_payload_fails_without_connecting() {
    let tone = tone_wav(440.0, 0.5);
    let dir = media_dir(&[
        ("noise.mp3", b"this is not audio at all".as_slice()),
        ("tone.mp3", tone.as_slice()),
    ]);

    let manager = manager_for(&dir, Arc::new(CoverSlot::new()));
    manager.build_graph(0.7).unwrap();

    let err = manager.request_playback("noise").await.unwrap_err();
    assert!(matches!(err, PulseError::Decode { .. }));
    assert_eq!(manager.graph().unwrap().connected_sources(), 0);

    let outcome = manager.request_playback("tone").await.unwrap();
    assert!(outcome.is_started());

    let tracks = FileTrackFetcher::new(dir.path()).list_tracks().await.unwrap();
    assert_eq!(tracks, vec!["noise".to_string(), "tone".to_string()]);
}

#[tokio::test]
async fn resizing_mid_playback_rebuilds_particles_without_interrupting_audio() {
    let tone = tone_wav(1_000.0, 4.0);
    let dir = media_dir(&[("tone.mp3", tone.as_slice())]);

    let manager = manager_for(&dir, Arc::new(CoverSlot::new()));
    let analyzer = manager.build_graph(0.7).unwrap().analyzer().clone();
    let renderer = Arc::new(Mutex::new(VisualizationRenderer::new(
        DisplayList::new(),
        RenderConfig {
            mode: VisualizationMode::Dot,
            ..Default::default()
        },
        analyzer.bin_count(),
    )));
    let mut scheduler = AnimationScheduler::new(analyzer, renderer.clone(), 60);

    assert!(manager.request_playback("tone").await.unwrap().is_started());
    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.tick().unwrap();

    let before = particles(&renderer);
    lock_renderer(&renderer).unwrap().resize(40, 30);
    let after = particles(&renderer);

    assert_eq!(manager.state(), SessionState::Playing);
    assert_eq!(manager.graph().unwrap().connected_sources(), 1);
    assert_eq!(after.len(), 64);
    assert_ne!(before, after);
    assert!(after.iter().all(|p| p.x <= 40.0 && p.y <= 30.0));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let frame = scheduler.tick().unwrap();
    assert!(frame.bins()[16] > 0);
    assert_eq!(manager.state(), SessionState::Playing);
}

fn particles(
    renderer: &Arc<Mutex<VisualizationRenderer<DisplayList>>>,
) -> Vec<Particle> {
    match lock_renderer(renderer).unwrap().state() {
        VisualizationState::Dot(dots) => dots.particles().to_vec(),
        other => panic!("unexpected state {other:?}"),
    }
}
