use itertools::Itertools;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid frame index '{0}'. Expected a non-negative integer.")]
    InvalidIndex(String),

    #[error("Invalid frame range '{0}'. Expected 'A..B' with A < B.")]
    InvalidRange(String),

    #[error("Frame {index} is out of range; the file contains {count} frame(s).")]
    OutOfRange { index: usize, count: usize },

    #[error("Frame selection is empty.")]
    Empty,
}

fn parse_index(token: &str) -> Result<usize, ParseError> {
    token
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidIndex(token.trim().to_string()))
}

/// Resolves a frame selection against a trajectory with `count` frames.
///
/// Accepts `all`, a single index `N`, a half-open range `A..B` (either bound
/// may be omitted), or a comma-separated list of those. Indices are returned
/// sorted and without duplicates.
pub fn parse_frame_selection(selection: &str, count: usize) -> Result<Vec<usize>, ParseError> {
    let selection = selection.trim();
    if selection.is_empty() {
        return Err(ParseError::Empty);
    }
    if selection.eq_ignore_ascii_case("all") {
        return Ok((0..count).collect());
    }

    let mut frames = Vec::new();
    for part in selection.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some((start, end)) = part.split_once("..") {
            let start = if start.trim().is_empty() { 0 } else { parse_index(start)? };
            let end = if end.trim().is_empty() { count } else { parse_index(end)? };
            if start >= end {
                return Err(ParseError::InvalidRange(part.to_string()));
            }
            if end > count {
                return Err(ParseError::OutOfRange { index: end - 1, count });
            }
            frames.extend(start..end);
        } else {
            let index = parse_index(part)?;
            if index >= count {
                return Err(ParseError::OutOfRange { index, count });
            }
            frames.push(index);
        }
    }

    let frames: Vec<usize> = frames.into_iter().sorted_unstable().dedup().collect();
    if frames.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_selects_every_frame() {
        assert_eq!(parse_frame_selection("all", 3).unwrap(), vec![0, 1, 2]);
        assert_eq!(parse_frame_selection(" ALL ", 2).unwrap(), vec![0, 1]);
    }

    #[test]
    fn ranges_and_lists_are_merged() {
        assert_eq!(parse_frame_selection("4, 0..2, 1", 6).unwrap(), vec![0, 1, 4]);
        assert_eq!(parse_frame_selection("3..", 5).unwrap(), vec![3, 4]);
        assert_eq!(parse_frame_selection("..2", 5).unwrap(), vec![0, 1]);
    }

    #[test]
    fn out_of_range_and_malformed_selections_are_rejected() {
        assert_eq!(
            parse_frame_selection("5", 5),
            Err(ParseError::OutOfRange { index: 5, count: 5 })
        );
        assert_eq!(
            parse_frame_selection("3..1", 5),
            Err(ParseError::InvalidRange("3..1".to_string()))
        );
        assert_eq!(
            parse_frame_selection("x", 5),
            Err(ParseError::InvalidIndex("x".to_string()))
        );
        assert_eq!(parse_frame_selection(" , ", 5), Err(ParseError::Empty));
    }
}
