use std::path::Path;
use tempfile::TempDir;
use video_search_transcription::{load_wav_samples, TranscriptionError, SAMPLE_RATE};

fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn test_load_pcm16_mono() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("speech.wav");
    write_wav(&path, SAMPLE_RATE, 1, &[0, 16384, -32768, 32767]);

    let samples = load_wav_samples(&path).unwrap();
    assert_eq!(samples.len(), 4);
    assert_eq!(samples[0], 0.0);
    assert!((samples[1] - 0.5).abs() < 1e-6);
    assert_eq!(samples[2], -1.0);
    assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
}

#[test]
fn test_reject_wrong_sample_rate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cd.wav");
    write_wav(&path, 44100, 1, &[0; 32]);

    let err = load_wav_samples(&path).unwrap_err();
    assert!(matches!(err, TranscriptionError::AudioLoadError(_)));
}

#[test]
fn test_reject_stereo() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stereo.wav");
    write_wav(&path, SAMPLE_RATE, 2, &[0; 32]);

    assert!(load_wav_samples(&path).is_err());
}

#[test]
fn test_missing_file() {
    assert!(load_wav_samples(Path::new("/nonexistent/audio.wav")).is_err());
}
