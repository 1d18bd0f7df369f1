//! Sequence point blobs of Portable PDB `MethodDebugInformation` rows.
//!
//! # Blob Format
//!
//! ```text
//! Header:   LocalSignature (StandAloneSig row id)
//!           InitialDocument (Document row id, only if the row's Document column is 0)
//! Records:  sequence point  δILOffset ΔLines ΔColumns [δStartLine δStartColumn]
//!           document record 0 Document
//! ```
//!
//! The first record's IL offset is absolute, later ones are deltas that must be non-zero; a
//! zero delta introduces a document record instead. `ΔColumns` is unsigned when `ΔLines` is
//! zero and signed otherwise. A point with both deltas zero is hidden and carries no start
//! position. The first visible point stores its start line and column as unsigned values,
//! later visible points as signed deltas to the previous visible one.
//!
//! See the Portable PDB format description, section "Sequence Points Blob".

use crate::{
    file::{
        io::{push_compressed_int, push_compressed_uint},
        parser::Parser,
    },
    Result,
};

/// Line number of hidden sequence points.
pub const HIDDEN_LINE: u32 = 0x00FE_EFEE;

/// A single mapping from an IL offset to a source span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePoint {
    /// Offset in the method's IL stream
    pub il_offset: u32,
    /// `Document` row the span lives in
    pub document: u32,
    /// Starting line, [`HIDDEN_LINE`] for hidden points
    pub start_line: u32,
    /// Starting column
    pub start_col: u16,
    /// Ending line
    pub end_line: u32,
    /// Ending column
    pub end_col: u16,
    /// `true` if the point hides the code that follows from the debugger
    pub is_hidden: bool,
}

impl SequencePoint {
    /// Creates a visible point covering the given span.
    #[must_use]
    pub fn new(
        il_offset: u32,
        document: u32,
        (start_line, start_col): (u32, u16),
        (end_line, end_col): (u32, u16),
    ) -> Self {
        SequencePoint {
            il_offset,
            document,
            start_line,
            start_col,
            end_line,
            end_col,
            is_hidden: false,
        }
    }

    /// Creates a hidden point.
    #[must_use]
    pub fn hidden(il_offset: u32, document: u32) -> Self {
        SequencePoint {
            il_offset,
            document,
            start_line: HIDDEN_LINE,
            start_col: 0,
            end_line: HIDDEN_LINE,
            end_col: 0,
            is_hidden: true,
        }
    }
}

/// The decoded sequence point blob of one method.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequencePoints {
    /// `StandAloneSig` row of the method's local signature, zero if it has none
    pub local_signature: u32,
    /// The document of the first point when the owning row does not name one
    pub initial_document: Option<u32>,
    /// The points in IL order
    pub points: Vec<SequencePoint>,
}

impl SequencePoints {
    /// Returns the sequence point for a given IL offset, if any.
    #[must_use]
    pub fn find_by_il_offset(&self, il_offset: u32) -> Option<&SequencePoint> {
        self.points.iter().find(|sp| sp.il_offset == il_offset)
    }

    /// The first point that is not hidden.
    #[must_use]
    pub fn first_visible(&self) -> Option<&SequencePoint> {
        self.points.iter().find(|sp| !sp.is_hidden)
    }

    /// Decodes a blob.
    ///
    /// `document` is the `Document` column of the owning `MethodDebugInformation` row; when
    /// it is zero the blob header carries the initial document instead.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated blobs and
    /// [`crate::Error::Malformed`] for values outside their ranges.
    pub fn parse(blob: &[u8], document: u32) -> Result<SequencePoints> {
        let mut parser = Parser::new(blob);
        let local_signature = parser.read_compressed_uint()?;
        let initial_document = if document == 0 {
            Some(parser.read_compressed_uint()?)
        } else {
            None
        };

        let mut current_document = initial_document.unwrap_or(document);
        let mut points = Vec::new();
        let mut il_offset = 0_u32;
        let mut previous_visible: Option<(u32, u16)> = None;

        while parser.has_more_data() {
            let delta_il = parser.read_compressed_uint()?;
            if delta_il == 0 && !points.is_empty() {
                current_document = parser.read_compressed_uint()?;
                continue;
            }
            il_offset = if points.is_empty() {
                delta_il
            } else {
                il_offset
                    .checked_add(delta_il)
                    .ok_or_else(|| malformed_error!("Sequence point IL offset overflows"))?
            };

            let delta_lines = parser.read_compressed_uint()?;
            let delta_cols = if delta_lines == 0 {
                i64::from(parser.read_compressed_uint()?)
            } else {
                i64::from(parser.read_compressed_int()?)
            };

            if delta_lines == 0 && delta_cols == 0 {
                points.push(SequencePoint::hidden(il_offset, current_document));
                continue;
            }

            let (start_line, start_col) = match previous_visible {
                None => (
                    i64::from(parser.read_compressed_uint()?),
                    i64::from(parser.read_compressed_uint()?),
                ),
                Some((line, col)) => (
                    i64::from(line) + i64::from(parser.read_compressed_int()?),
                    i64::from(col) + i64::from(parser.read_compressed_int()?),
                ),
            };
            let end_line = start_line + i64::from(delta_lines);
            let end_col = start_col + delta_cols;

            let start_line = u32::try_from(start_line)
                .map_err(|_| malformed_error!("Invalid start line - {}", start_line))?;
            let start_col = u16::try_from(start_col)
                .map_err(|_| malformed_error!("Invalid start column - {}", start_col))?;
            let end_line = u32::try_from(end_line)
                .map_err(|_| malformed_error!("Invalid end line - {}", end_line))?;
            let end_col = u16::try_from(end_col)
                .map_err(|_| malformed_error!("Invalid end column - {}", end_col))?;

            previous_visible = Some((start_line, start_col));
            points.push(SequencePoint::new(
                il_offset,
                current_document,
                (start_line, start_col),
                (end_line, end_col),
            ));
        }

        Ok(SequencePoints {
            local_signature,
            initial_document,
            points,
        })
    }

    /// Encodes the points back into a blob.
    ///
    /// The first point is expected in the initial document (or the owning row's document);
    /// later document changes are written as document records.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if points are not in strictly ascending IL order
    /// or a span ends before it starts.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(4 + self.points.len() * 5);
        push_compressed_uint(&mut out, self.local_signature)?;
        if let Some(document) = self.initial_document {
            push_compressed_uint(&mut out, document)?;
        }

        let mut current_document = self
            .initial_document
            .or_else(|| self.points.first().map(|sp| sp.document))
            .unwrap_or(0);
        let mut previous: Option<u32> = None;
        let mut previous_visible: Option<(u32, u16)> = None;

        for point in &self.points {
            if previous.is_some() && point.document != current_document {
                push_compressed_uint(&mut out, 0)?;
                push_compressed_uint(&mut out, point.document)?;
                current_document = point.document;
            }

            let delta_il = match previous {
                None => point.il_offset,
                Some(offset) if point.il_offset > offset => point.il_offset - offset,
                Some(offset) => {
                    return Err(malformed_error!(
                        "Sequence point at {:#x} does not follow {:#x}",
                        point.il_offset,
                        offset
                    ))
                }
            };
            push_compressed_uint(&mut out, delta_il)?;
            previous = Some(point.il_offset);

            if point.is_hidden {
                push_compressed_uint(&mut out, 0)?;
                push_compressed_uint(&mut out, 0)?;
                continue;
            }

            let Some(delta_lines) = point.end_line.checked_sub(point.start_line) else {
                return Err(malformed_error!(
                    "Sequence point ends on line {} before it starts on line {}",
                    point.end_line,
                    point.start_line
                ));
            };
            let delta_cols = i32::from(point.end_col) - i32::from(point.start_col);
            push_compressed_uint(&mut out, delta_lines)?;
            if delta_lines == 0 {
                let Ok(delta_cols) = u32::try_from(delta_cols) else {
                    return Err(malformed_error!(
                        "Single-line sequence point ends at column {} before {}",
                        point.end_col,
                        point.start_col
                    ));
                };
                if delta_cols == 0 {
                    return Err(malformed_error!(
                        "Visible sequence point at {:#x} has an empty span",
                        point.il_offset
                    ));
                }
                push_compressed_uint(&mut out, delta_cols)?;
            } else {
                push_compressed_int(&mut out, delta_cols)?;
            }

            match previous_visible {
                None => {
                    push_compressed_uint(&mut out, point.start_line)?;
                    push_compressed_uint(&mut out, u32::from(point.start_col))?;
                }
                Some((line, col)) => {
                    push_compressed_int(&mut out, point.start_line as i32 - line as i32)?;
                    push_compressed_int(
                        &mut out,
                        i32::from(point.start_col) - i32::from(col),
                    )?;
                }
            }
            previous_visible = Some((point.start_line, point.start_col));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_only() {
        let points = SequencePoints::parse(&[0x02], 1).unwrap();
        assert_eq!(points.local_signature, 2);
        assert_eq!(points.initial_document, None);
        assert!(points.points.is_empty());

        let points = SequencePoints::parse(&[0x00, 0x03], 0).unwrap();
        assert_eq!(points.initial_document, Some(3));
        assert!(SequencePoints::parse(&[], 1).is_err());
    }

    #[test]
    fn visible_points_use_deltas() {
        // header: no locals
        // sp 0: il 0, one line, 5 columns wide, starting at 10:2
        // sp 1: il +3, one line, 2 columns wide, start +1 line and +1 column
        let blob = [0x00, 0x00, 0x00, 0x05, 0x0A, 0x02, 0x03, 0x00, 0x02, 0x02, 0x02];
        let points = SequencePoints::parse(&blob, 1).unwrap();
        assert_eq!(points.points.len(), 2);

        let first = &points.points[0];
        assert_eq!((first.il_offset, first.start_line, first.start_col), (0, 10, 2));
        assert_eq!((first.end_line, first.end_col), (10, 7));

        let second = &points.points[1];
        assert_eq!((second.il_offset, second.start_line, second.start_col), (3, 11, 3));
        assert_eq!((second.end_line, second.end_col), (11, 5));
        assert_eq!(points.first_visible(), Some(first));
        assert_eq!(points.encode().unwrap(), blob);
    }

    #[test]
    fn hidden_points_and_documents() {
        let points = SequencePoints {
            local_signature: 4,
            initial_document: Some(1),
            points: vec![
                SequencePoint::hidden(0, 1),
                SequencePoint::new(2, 1, (7, 9), (9, 4)),
                SequencePoint::new(6, 2, (3, 1), (3, 20)),
            ],
        };

        let blob = points.encode().unwrap();
        assert_eq!(SequencePoints::parse(&blob, 0).unwrap(), points);

        let visible = SequencePoints::parse(&blob, 0).unwrap();
        assert_eq!(visible.first_visible().map(|sp| sp.il_offset), Some(2));
        assert!(visible.find_by_il_offset(0).unwrap().is_hidden);
        assert_eq!(visible.find_by_il_offset(6).unwrap().document, 2);
    }

    #[test]
    fn unordered_points_are_rejected() {
        let points = SequencePoints {
            local_signature: 0,
            initial_document: None,
            points: vec![
                SequencePoint::new(4, 1, (1, 1), (1, 2)),
                SequencePoint::new(4, 1, (2, 1), (2, 2)),
            ],
        };
        assert!(points.encode().is_err());
    }
}
