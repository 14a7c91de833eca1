//! Helpers for recognising audiovisual material by name and layout. Nothing here inspects file
//! contents; callers that need that supply it, see `digital_object_descriptor`.

use std::path::{Path, PathBuf};

use snafu::ResultExt;
use walkdir::WalkDir;

use crate::archive::error::*;
use crate::archive::io::{file_name_str, is_hidden_file, sorted_children};

const AV_EXTENSIONS: [&str; 12] = [
    "mov", "mp4", "mkv", "mxf", "dv", "3gp", "webm", "swf", "avi", "wav", "stl", "m2t",
];
const DOCUMENT_EXTENSIONS: [&str; 22] = [
    "tif", "tiff", "doc", "txt", "docx", "pdf", "jpg", "jpeg", "png", "rtf", "xml", "odt", "cr2",
    "epub", "ppt", "pptx", "xls", "xlsx", "gif", "bmp", "csv", "zip",
];
const RECURSIVE_AV_EXTENSIONS: [&str; 10] = [
    "mp4", "mov", "mkv", "mxf", "wav", "aiff", "mp3", "m2t", "dv", "iso",
];
const VIDEO_EXTENSIONS: [&str; 11] = [
    "mov", "mp4", "mkv", "mxf", "dv", "3gp", "webm", "swf", "avi", "m2t", "iso",
];
// In order of preference
const IMAGE_SEQUENCE_EXTENSIONS: [&str; 3] = ["dpx", "tiff", "tif"];

const PLACEHOLDER_START: &str = "864000";
const AUDIO_EDIT_RATE: f64 = 24.0;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MediaKind {
    Av,
    Document,
    Other,
}

/// The parts of an image sequence's file names, in the form ffmpeg expects
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ImageSequence {
    /// printf style input pattern, eg `film_%06d.dpx`
    pub pattern: String,
    pub start_number: String,
    /// The file name without the frame number or extension
    pub root_filename: String,
    pub container: String,
}

/// Sorts a file into AV, document or other by its extension
pub fn classify(name: &str) -> MediaKind {
    let ext = extension(Path::new(name));
    if AV_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Av
    } else if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Document
    } else {
        MediaKind::Other
    }
}

/// Every AV file beneath `dir`
pub fn av_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir.as_ref()).sort_by_file_name() {
        let entry = entry.context(WalkFileSnafu {})?;
        if entry.file_type().is_file()
            && RECURSIVE_AV_EXTENSIONS.contains(&extension(entry.path()).as_str())
        {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// The video files directly inside `source`, or `source` itself when it is a file
pub fn video_files<P: AsRef<Path>>(source: P) -> Result<Vec<PathBuf>> {
    let source = source.as_ref();
    if source.is_file() {
        return Ok(vec![source.into()]);
    }
    if !source.is_dir() {
        return Ok(Vec::new());
    }

    Ok(sorted_children(source)?
        .into_iter()
        .filter(|f| {
            f.file_name().map(|n| !is_hidden_file(n)).unwrap_or(false)
                && VIDEO_EXTENSIONS.contains(&extension(f).as_str())
        })
        .collect())
}

/// The frames of the image sequence in `dir`, sorted. DPX is preferred over TIFF. Empty when the
/// directory holds no image sequence.
pub fn image_sequence_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let children = sorted_children(dir)?;
    for wanted in IMAGE_SEQUENCE_EXTENSIONS {
        let frames: Vec<PathBuf> = children
            .iter()
            .filter(|f| f.is_file() && f.extension().and_then(|e| e.to_str()) == Some(wanted))
            .cloned()
            .collect();
        if !frames.is_empty() {
            return Ok(frames);
        }
    }
    Ok(Vec::new())
}

/// The subdirectories of `dir` that hold image sequences, one per reel
pub fn multi_reel<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut reels = Vec::new();
    for child in sorted_children(dir)? {
        if child.is_dir() && !image_sequence_files(&child)?.is_empty() {
            reels.push(child);
        }
    }
    Ok(reels)
}

/// Works out the ffmpeg input pattern from the name of the first frame of a sequence. Frame
/// numbers follow the last `_`, or sit between the last two `.` when the name has more than one.
pub fn parse_image_sequence(first_frame: &str) -> Option<ImageSequence> {
    let (_, container) = first_frame.rsplit_once('.')?;
    let last_part = first_frame.rsplit('_').next().unwrap_or(first_frame);
    let dot_parts: Vec<&str> = last_part.split('.').collect();
    let dotted = dot_parts.len() > 2;

    let start_number = if first_frame.contains(PLACEHOLDER_START) {
        PLACEHOLDER_START.to_string()
    } else if dotted {
        dot_parts[1].to_string()
    } else {
        dot_parts[0].to_string()
    };

    let prefix = if dotted {
        let parts: Vec<&str> = first_frame.split('.').collect();
        parts[..parts.len() - 2]
            .iter()
            .map(|p| format!("{}.", p))
            .collect::<String>()
    } else {
        let parts: Vec<&str> = first_frame.split('_').collect();
        parts[..parts.len() - 1]
            .iter()
            .map(|p| format!("{}_", p))
            .collect::<String>()
    };

    let root_filename = prefix
        .char_indices()
        .last()
        .map(|(i, _)| prefix[..i].to_string())
        .unwrap_or_default();

    Some(ImageSequence {
        pattern: format!(
            "{}%0{}d.{}",
            prefix,
            start_number.len(),
            container
        ),
        start_number,
        root_filename,
        container: container.to_string(),
    })
}

/// Formats milliseconds as `HH:MM:SS.mmm`
pub fn convert_millis(millis: u64) -> String {
    let hours = millis / 3_600_000;
    let minutes = millis / 60_000 % 60;
    let seconds = millis / 1000 % 60;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        hours,
        minutes,
        seconds,
        millis % 1000
    )
}

/// The number of frames at `fps` in the given number of milliseconds
pub fn ms_to_frames(fps: f64, millis: f64) -> u64 {
    (fps / 1000.0 * millis).round() as u64
}

/// Converts `HH:MM:SS.mm` to `HH:MM:SS:FF`. None if the timecode is malformed.
pub fn convert_timecode(fps: f64, timecode: &str) -> Option<String> {
    let mut parts = timecode.trim().split(':');
    let (hh, mm, ss_ms) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let (ss, ms) = ss_ms.split_once('.')?;
    let frames = ms_to_frames(fps, ms.parse().ok()?);
    Some(format!("{}:{}:{}:{:02}", hh, mm, ss, frames))
}

/// Converts an audio frame count to seconds, rounded to three decimal places
pub fn frames_to_seconds(frames: f64) -> f64 {
    (frames / AUDIO_EDIT_RATE * 1000.0).round() / 1000.0
}

/// A high level description of the AV material beneath `dir`, based on how many files of each
/// type it holds. `is_as11` decides whether an MXF file is an AS-11 package.
pub fn digital_object_descriptor<P, F>(dir: P, is_as11: F) -> Result<Option<&'static str>>
where
    P: AsRef<Path>,
    F: Fn(&Path) -> bool,
{
    let mut counts = DescriptorCounts::default();

    for entry in WalkDir::new(dir.as_ref()).sort_by_file_name() {
        let entry = entry.context(WalkFileSnafu {})?;
        if entry.file_type().is_dir() {
            if file_name_str(entry.path()) == "BPAV" {
                counts.bpav = true;
            }
            continue;
        }

        let name = file_name_str(entry.path()).to_lowercase();
        if name.ends_with("mkv") {
            counts.mkv += 1;
        } else if name.ends_with("mov") {
            counts.mov += 1;
        } else if name.ends_with("mp4") {
            counts.mp4 += 1;
        } else if name.ends_with("wav") {
            counts.wav += 1;
        } else if name.ends_with("aiff") {
            counts.aiff += 1;
        } else if name.ends_with("mp3") {
            counts.mp3 += 1;
        } else if name.ends_with("stl") {
            counts.stl += 1;
        } else if name.ends_with("m2t") {
            counts.m2t += 1;
        } else if name.ends_with("mxf") {
            counts.mxf += 1;
            if is_as11(entry.path()) {
                counts.as11 = true;
            }
        }
    }

    Ok(counts.descriptor())
}

#[derive(Debug, Default)]
struct DescriptorCounts {
    mkv: usize,
    mov: usize,
    mp4: usize,
    wav: usize,
    aiff: usize,
    mp3: usize,
    stl: usize,
    m2t: usize,
    mxf: usize,
    bpav: bool,
    as11: bool,
}

impl DescriptorCounts {
    fn descriptor(&self) -> Option<&'static str> {
        // The first matching count decides, even when its own conditions then fail
        if self.mkv == 1 {
            Some("Matroska")
        } else if self.stl == 1 {
            (self.mxf == 1 && self.as11).then(|| "AS-11 package (STL)")
        } else if self.mxf == 1 {
            (self.stl == 0 && self.as11).then(|| "AS-11 package")
        } else if self.mov == 1 {
            Some("QuickTime")
        } else if self.wav == 1 {
            Some("Wave")
        } else if self.aiff == 1 {
            Some("AIFF")
        } else if self.mp3 == 1 {
            Some("MP3")
        } else if self.mov > 1 {
            Some("Multiple QuickTimes")
        } else if self.mp4 >= 1 {
            self.bpav.then(|| "XDCAM EX")
        } else if self.m2t >= 1 {
            Some("MPEG-2 Transport Stream")
        } else {
            None
        }
    }
}

/// The total size in bytes of every file beneath `dir`
pub fn folder_size<P: AsRef<Path>>(dir: P) -> Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(dir.as_ref()) {
        let entry = entry.context(WalkFileSnafu {})?;
        if entry.file_type().is_file() {
            total += entry.metadata().context(WalkFileSnafu {})?.len();
        }
    }
    Ok(total)
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase()
}
