//! Engine argument construction.
//!
//! [`build_args`] turns a [`JobRequest`] into the exact ffmpeg argument list.
//! It performs no I/O, so every (operation, options) pair can be checked by
//! asserting on the returned vector.

use std::path::{Path, PathBuf};

use rf_core::{Error, JobRequest, Operation, Quality, Result};

use crate::command::ToolCommand;
use crate::tools::FFMPEG;

/// Filter chain forced on every GIF target.
pub const GIF_FILTER: &str = "fps=10,scale=320:-1:flags=lanczos";

/// Default thumbnail seek position in seconds.
pub const DEFAULT_THUMBNAIL_OFFSET: f64 = 1.0;

/// Arguments placed before everything else: quiet banner, overwrite output,
/// machine-readable progress blocks on stderr.
const PREAMBLE: [&str; 5] = ["-hide_banner", "-y", "-progress", "pipe:2", "-nostats"];

/// Video/audio bitrate pair for a quality tier.
pub fn quality_bitrates(quality: Quality) -> (&'static str, &'static str) {
    match quality {
        Quality::Low => ("500k", "128k"),
        Quality::Medium => ("1000k", "192k"),
        Quality::High => ("2000k", "320k"),
    }
}

/// Audio encoder used when extracting audio to `format`.
pub fn audio_codec_for(format: &str) -> Option<&'static str> {
    match format {
        "mp3" => Some("libmp3lame"),
        "wav" => Some("pcm_s16le"),
        "aac" => Some("aac"),
        _ => None,
    }
}

/// Muxer name passed with `-f` for formats the engine should not guess.
fn muxer_for(format: &str) -> Option<&'static str> {
    match format {
        "mp4" => Some("mp4"),
        "mov" => Some("mov"),
        "mkv" => Some("matroska"),
        "webm" => Some("webm"),
        "avi" => Some("avi"),
        "flv" => Some("flv"),
        "gif" => Some("gif"),
        "mp3" => Some("mp3"),
        "wav" => Some("wav"),
        "aac" => Some("adts"),
        _ => None,
    }
}

/// Build the full ffmpeg argument list for `request`.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] when the request has the wrong number
/// of inputs, an empty output path, a non-positive fps or thumbnail offset,
/// or (for audio extraction) a format with no known encoder.
pub fn build_args(request: &JobRequest) -> Result<Vec<String>> {
    check_shape(request)?;

    let mut args = Args::default();
    args.extend(PREAMBLE);

    match request.operation {
        Operation::Convert => convert(request, &mut args),
        Operation::Compress => compress(request, &mut args),
        Operation::Thumbnail => thumbnail(request, &mut args)?,
        Operation::ExtractAudio => extract_audio(request, &mut args)?,
        Operation::Merge => merge(request, &mut args),
    }

    args.push_path(&request.output);
    Ok(args.0)
}

/// Human-readable `ffmpeg ...` line for `args`, quoted where needed.
pub fn describe(args: &[String]) -> String {
    ToolCommand::new(PathBuf::from(FFMPEG))
        .args(args.iter().cloned())
        .command_line()
}

fn check_shape(request: &JobRequest) -> Result<()> {
    if request.inputs.is_empty() {
        return Err(match request.operation {
            Operation::Merge => Error::invalid("merge requires at least one input"),
            op => Error::invalid(format!("{op} requires an input file")),
        });
    }
    if !request.operation.is_multi_input() && request.inputs.len() != 1 {
        return Err(Error::invalid(format!(
            "{} takes exactly one input, got {}",
            request.operation,
            request.inputs.len()
        )));
    }
    if let Some(p) = request.inputs.iter().find(|p| p.as_os_str().is_empty()) {
        return Err(Error::invalid(format!("empty input path {p:?}")));
    }
    if request.output.as_os_str().is_empty() {
        return Err(Error::invalid("output path is empty"));
    }
    if let Some(fps) = request.options.fps {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(Error::invalid(format!("fps must be positive, got {fps}")));
        }
    }
    Ok(())
}

fn convert(request: &JobRequest, args: &mut Args) {
    args.input(&request.inputs[0]);
    let format = request.target_format();

    match format.as_deref() {
        Some("gif") => gif_chain(args),
        Some("webm") => {
            webm_codecs(args);
            encode_settings(request, args);
        }
        _ => encode_settings(request, args),
    }

    args.muxer(format.as_deref());
}

fn compress(request: &JobRequest, args: &mut Args) {
    args.input(&request.inputs[0]);
    let format = request.target_format();

    match format.as_deref() {
        Some("gif") => gif_chain(args),
        Some("webm") => {
            webm_codecs(args);
            encode_settings(request, args);
        }
        _ => {
            args.extend(["-c:v", "libx264", "-preset", "medium", "-c:a", "aac"]);
            encode_settings(request, args);
        }
    }

    args.muxer(format.as_deref());
}

fn thumbnail(request: &JobRequest, args: &mut Args) -> Result<()> {
    let offset = request.options.time_offset.unwrap_or(DEFAULT_THUMBNAIL_OFFSET);
    if !offset.is_finite() || offset < 0.0 {
        return Err(Error::invalid(format!(
            "thumbnail offset must be non-negative, got {offset}"
        )));
    }

    args.extend(["-ss".to_string(), offset.to_string()]);
    args.input(&request.inputs[0]);
    args.extend(["-frames:v", "1"]);
    if let Some(res) = request.options.resolution {
        args.extend(["-s".to_string(), res.to_string()]);
    }
    Ok(())
}

fn extract_audio(request: &JobRequest, args: &mut Args) -> Result<()> {
    let format = request
        .target_format()
        .ok_or_else(|| Error::invalid("cannot determine audio format; set format or use an extension"))?;

    let codec = match request.options.audio_codec.as_deref() {
        Some(c) if !c.trim().is_empty() => c.trim().to_string(),
        _ => audio_codec_for(&format)
            .ok_or_else(|| Error::invalid(format!("unsupported audio format '{format}'")))?
            .to_string(),
    };

    args.input(&request.inputs[0]);
    args.extend(["-vn".to_string(), "-c:a".to_string(), codec.clone()]);
    if !codec.starts_with("pcm_") {
        let (_, audio) = quality_bitrates(request.quality());
        args.extend(["-b:a", audio]);
    }
    args.muxer(Some(&format));
    Ok(())
}

fn merge(request: &JobRequest, args: &mut Args) {
    for input in &request.inputs {
        args.input(input);
    }

    let n = request.inputs.len();
    let format = request.target_format();

    // GIF has no audio track, so only the video streams are concatenated
    // and the fixed filter chain runs on the joined result.
    if format.as_deref() == Some("gif") {
        let mut graph: String = (0..n).map(|i| format!("[{i}:v:0]")).collect();
        graph.push_str(&format!("concat=n={n}:v=1:a=0[outv];[outv]{GIF_FILTER}[gif]"));
        args.extend(["-filter_complex".to_string(), graph]);
        args.extend(["-map", "[gif]", "-an"]);
        args.muxer(format.as_deref());
        return;
    }

    let mut graph: String = (0..n).map(|i| format!("[{i}:v:0][{i}:a:0]")).collect();
    graph.push_str(&format!("concat=n={n}:v=1:a=1[outv][outa]"));
    args.extend(["-filter_complex".to_string(), graph]);
    args.extend(["-map", "[outv]", "-map", "[outa]"]);

    if format.as_deref() == Some("webm") {
        webm_codecs(args);
    }
    encode_settings(request, args);
    args.muxer(format.as_deref());
}

fn gif_chain(args: &mut Args) {
    args.extend(["-vf", GIF_FILTER, "-an"]);
}

fn webm_codecs(args: &mut Args) {
    args.extend(["-c:v", "libvpx-vp9", "-c:a", "libvorbis"]);
}

/// Quality bitrates plus resolution and fps overrides.
fn encode_settings(request: &JobRequest, args: &mut Args) {
    let (video, audio) = quality_bitrates(request.quality());
    args.extend(["-b:v", video, "-b:a", audio]);

    if let Some(res) = request.options.resolution {
        args.extend(["-s".to_string(), res.to_string()]);
    }
    if let Some(fps) = request.options.fps {
        args.extend(["-r".to_string(), fps.to_string()]);
    }
}

#[derive(Default)]
struct Args(Vec<String>);

impl Args {
    fn extend<S: Into<String>>(&mut self, items: impl IntoIterator<Item = S>) {
        self.0.extend(items.into_iter().map(Into::into));
    }

    fn push_path(&mut self, path: &Path) {
        self.0.push(path.to_string_lossy().into_owned());
    }

    fn input(&mut self, path: &Path) {
        self.0.push("-i".to_string());
        self.push_path(path);
    }

    fn muxer(&mut self, format: Option<&str>) {
        if let Some(muxer) = format.and_then(muxer_for) {
            self.extend(["-f", muxer]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rf_core::{JobOptions, Resolution};
    use std::path::PathBuf;

    fn request(op: Operation, inputs: &[&str], output: &str) -> JobRequest {
        JobRequest::new(op, inputs.iter().map(PathBuf::from).collect(), output)
    }

    fn with(op: Operation, output: &str, options: JobOptions) -> JobRequest {
        request(op, &["in.mov"], output).with_options(options)
    }

    /// Assert that `needle` appears in `args` as a contiguous run.
    fn assert_run(args: &[String], needle: &[&str]) {
        let found = args
            .windows(needle.len())
            .any(|w| w.iter().zip(needle).all(|(a, b)| a == b));
        assert!(found, "expected {needle:?} in {args:?}");
    }

    #[test]
    fn preamble_and_output_position() {
        let args = build_args(&request(Operation::Convert, &["a.mov"], "a.mp4")).unwrap();
        assert_eq!(&args[..5], &PREAMBLE);
        assert_eq!(args.last().map(String::as_str), Some("a.mp4"));
    }

    #[test]
    fn convert_defaults_to_medium_quality() {
        let args = build_args(&request(Operation::Convert, &["a.mov"], "a.mp4")).unwrap();
        assert_run(&args, &["-i", "a.mov"]);
        assert_run(&args, &["-b:v", "1000k", "-b:a", "192k"]);
        assert_run(&args, &["-f", "mp4"]);
        assert!(!args.contains(&"-s".to_string()));
        assert!(!args.contains(&"-r".to_string()));
    }

    #[test]
    fn low_quality_bitrates() {
        let req = with(
            Operation::Convert,
            "out.mp4",
            JobOptions { quality: Some(Quality::Low), ..Default::default() },
        );
        let args = build_args(&req).unwrap();
        assert_run(&args, &["-b:v", "500k", "-b:a", "128k"]);
    }

    #[test]
    fn high_quality_bitrates() {
        let req = with(
            Operation::Compress,
            "out.mp4",
            JobOptions { quality: Some(Quality::High), ..Default::default() },
        );
        let args = build_args(&req).unwrap();
        assert_run(&args, &["-b:v", "2000k", "-b:a", "320k"]);
    }

    #[test]
    fn resolution_and_fps_overrides() {
        let req = with(
            Operation::Convert,
            "out.mov",
            JobOptions {
                resolution: Some(Resolution { width: 1280, height: 720 }),
                fps: Some(29.97),
                ..Default::default()
            },
        );
        let args = build_args(&req).unwrap();
        assert_run(&args, &["-s", "1280x720"]);
        assert_run(&args, &["-r", "29.97"]);
        assert_run(&args, &["-f", "mov"]);
    }

    #[test]
    fn gif_forces_filter_chain() {
        let req = with(
            Operation::Convert,
            "out.gif",
            JobOptions {
                quality: Some(Quality::High),
                resolution: Some(Resolution { width: 1920, height: 1080 }),
                ..Default::default()
            },
        );
        let args = build_args(&req).unwrap();
        assert_run(&args, &["-vf", "fps=10,scale=320:-1:flags=lanczos", "-an"]);
        assert_run(&args, &["-f", "gif"]);
        assert!(!args.contains(&"-b:v".to_string()));
        assert!(!args.contains(&"1920x1080".to_string()));
    }

    #[test]
    fn explicit_format_overrides_extension() {
        let req = with(
            Operation::Convert,
            "clip.bin",
            JobOptions { format: Some("gif".into()), ..Default::default() },
        );
        let args = build_args(&req).unwrap();
        assert_run(&args, &["-vf", GIF_FILTER]);
    }

    #[test]
    fn webm_selects_vp9_and_vorbis() {
        let args = build_args(&request(Operation::Convert, &["a.mov"], "a.webm")).unwrap();
        assert_run(&args, &["-c:v", "libvpx-vp9", "-c:a", "libvorbis"]);
        assert_run(&args, &["-f", "webm"]);
    }

    #[test]
    fn unknown_format_uses_engine_defaults() {
        let args = build_args(&request(Operation::Convert, &["a.mov"], "a.ts")).unwrap();
        assert!(!args.contains(&"-c:v".to_string()));
        assert!(!args.contains(&"-f".to_string()));
    }

    #[test]
    fn compress_uses_x264() {
        let args = build_args(&request(Operation::Compress, &["a.mov"], "small.mp4")).unwrap();
        assert_run(&args, &["-c:v", "libx264", "-preset", "medium", "-c:a", "aac"]);
        assert_run(&args, &["-b:v", "1000k", "-b:a", "192k"]);
    }

    #[test]
    fn compress_webm_keeps_webm_codecs() {
        let args = build_args(&request(Operation::Compress, &["a.mov"], "small.webm")).unwrap();
        assert_run(&args, &["-c:v", "libvpx-vp9"]);
        assert!(!args.contains(&"libx264".to_string()));
    }

    #[test]
    fn thumbnail_default_offset() {
        let args = build_args(&request(Operation::Thumbnail, &["a.mov"], "thumb.png")).unwrap();
        assert_run(&args, &["-ss", "1", "-i", "a.mov", "-frames:v", "1"]);
        assert_eq!(args.last().map(String::as_str), Some("thumb.png"));
    }

    #[test]
    fn thumbnail_offset_and_size() {
        let req = with(
            Operation::Thumbnail,
            "thumb.jpg",
            JobOptions {
                time_offset: Some(12.5),
                resolution: Some(Resolution { width: 320, height: 180 }),
                ..Default::default()
            },
        );
        let args = build_args(&req).unwrap();
        assert_run(&args, &["-ss", "12.5", "-i", "in.mov"]);
        assert_run(&args, &["-s", "320x180"]);
    }

    #[test]
    fn thumbnail_negative_offset_rejected() {
        let req = with(
            Operation::Thumbnail,
            "thumb.jpg",
            JobOptions { time_offset: Some(-1.0), ..Default::default() },
        );
        assert_matches!(build_args(&req), Err(Error::InvalidRequest(_)));
    }

    #[test]
    fn extract_audio_codec_table() {
        for (ext, codec) in [("mp3", "libmp3lame"), ("wav", "pcm_s16le"), ("aac", "aac")] {
            let args =
                build_args(&request(Operation::ExtractAudio, &["a.mov"], &format!("a.{ext}")))
                    .unwrap();
            assert_run(&args, &["-vn", "-c:a", codec]);
        }
    }

    #[test]
    fn extract_audio_wav_has_no_bitrate() {
        let args = build_args(&request(Operation::ExtractAudio, &["a.mov"], "a.wav")).unwrap();
        assert!(!args.contains(&"-b:a".to_string()));
    }

    #[test]
    fn extract_audio_mp3_uses_quality_audio_bitrate() {
        let req = with(
            Operation::ExtractAudio,
            "a.mp3",
            JobOptions { quality: Some(Quality::Low), ..Default::default() },
        );
        let args = build_args(&req).unwrap();
        assert_run(&args, &["-b:a", "128k"]);
        assert!(!args.contains(&"-b:v".to_string()));
    }

    #[test]
    fn extract_audio_codec_override() {
        let req = with(
            Operation::ExtractAudio,
            "a.ogg",
            JobOptions { audio_codec: Some("libopus".into()), ..Default::default() },
        );
        let args = build_args(&req).unwrap();
        assert_run(&args, &["-c:a", "libopus"]);
    }

    #[test]
    fn extract_audio_unknown_format_rejected() {
        let req = request(Operation::ExtractAudio, &["a.mov"], "a.ogg");
        assert_matches!(build_args(&req), Err(Error::InvalidRequest(_)));
    }

    #[test]
    fn merge_concatenates_all_inputs() {
        let args =
            build_args(&request(Operation::Merge, &["a.mp4", "b.mp4", "c.mp4"], "abc.mp4")).unwrap();
        assert_run(&args, &["-i", "a.mp4", "-i", "b.mp4", "-i", "c.mp4"]);
        assert_run(
            &args,
            &[
                "-filter_complex",
                "[0:v:0][0:a:0][1:v:0][1:a:0][2:v:0][2:a:0]concat=n=3:v=1:a=1[outv][outa]",
                "-map",
                "[outv]",
                "-map",
                "[outa]",
            ],
        );
        assert_eq!(args.last().map(String::as_str), Some("abc.mp4"));
    }

    #[test]
    fn merge_single_input_is_allowed() {
        let args = build_args(&request(Operation::Merge, &["a.mp4"], "copy.mp4")).unwrap();
        assert_run(&args, &["concat=n=1:v=1:a=1[outv][outa]"]);
    }

    #[test]
    fn merge_to_gif_uses_filter_chain() {
        let args = build_args(&request(Operation::Merge, &["a.mp4", "b.mp4"], "ab.gif")).unwrap();
        assert_run(
            &args,
            &[
                "-filter_complex",
                "[0:v:0][1:v:0]concat=n=2:v=1:a=0[outv];[outv]fps=10,scale=320:-1:flags=lanczos[gif]",
                "-map",
                "[gif]",
                "-an",
                "-f",
                "gif",
            ],
        );
        assert!(!args.iter().any(|a| a == "[outa]" || a == "-b:a" || a == "-b:v"));
        assert_eq!(args.last().map(String::as_str), Some("ab.gif"));
    }

    #[test]
    fn merge_without_inputs_rejected() {
        let err = build_args(&request(Operation::Merge, &[], "out.mp4")).unwrap_err();
        assert_matches!(err, Error::InvalidRequest(ref m) if m.contains("at least one input"));
    }

    #[test]
    fn single_input_operations_reject_many() {
        let req = request(Operation::Convert, &["a.mov", "b.mov"], "out.mp4");
        assert_matches!(build_args(&req), Err(Error::InvalidRequest(_)));
    }

    #[test]
    fn empty_output_rejected() {
        let req = request(Operation::Convert, &["a.mov"], "");
        assert_matches!(build_args(&req), Err(Error::InvalidRequest(_)));
    }

    #[test]
    fn describe_quotes_paths_with_spaces() {
        let args = build_args(&request(Operation::Convert, &["my clip.mov"], "out.mp4")).unwrap();
        let line = describe(&args);
        assert!(line.starts_with("ffmpeg -hide_banner -y"));
        assert!(line.contains("-i \"my clip.mov\""));
        assert!(line.ends_with("out.mp4"));
    }

    #[test]
    fn zero_fps_rejected() {
        let req = with(
            Operation::Convert,
            "out.mp4",
            JobOptions { fps: Some(0.0), ..Default::default() },
        );
        assert_matches!(build_args(&req), Err(Error::InvalidRequest(_)));
    }
}
