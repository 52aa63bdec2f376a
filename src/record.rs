/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Graph-node records and their binary codec.
//!
//! A [`NodeRecord`] is the unit of exchange between every stage of the
//! computation: it is what ingestion writes, what the propagation stage sends
//! through the shuffle, and what every generation directory stores. Ranks are
//! always natural logarithms of probabilities, with [`f32::NEG_INFINITY`]
//! standing for probability zero.
//!
//! # Wire format
//!
//! | field     | size            | present for            |
//! |-----------|-----------------|------------------------|
//! | tag       | 1 byte          | all                    |
//! | node id   | 4 bytes, BE     | all                    |
//! | rank      | 4 bytes, BE     | `Mass`, `Complete`     |
//! | count     | 4 bytes, BE     | `Structure`, `Complete`|
//! | adjacency | 4 × count bytes | `Structure`, `Complete`|
//!
//! Ranks are stored as IEEE-754 single-precision bit patterns, so encoding and
//! decoding are exact.

use std::io::{ErrorKind, Read, Write};
use thiserror::Error;

/// A graph vertex identifier.
pub type NodeId = u32;

/// The tag of a [`NodeRecord`], which is also its first byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Variant {
    /// Adjacency and rank.
    Complete = 0,
    /// Rank only: a message carrying probability mass to a node.
    Mass = 1,
    /// Adjacency only.
    Structure = 2,
}

impl Variant {
    /// Returns the byte used on the wire for this variant.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parses a tag byte.
    pub fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(Variant::Complete),
            1 => Ok(Variant::Mass),
            2 => Ok(Variant::Structure),
            tag => Err(DecodeError::UnknownTag { tag }),
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Complete => f.write_str("complete"),
            Variant::Mass => f.write_str("mass"),
            Variant::Structure => f.write_str("structure"),
        }
    }
}

/// Errors raised while decoding a [`NodeRecord`].
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unknown record tag {tag:#04x}")]
    UnknownTag { tag: u8 },
    #[error("Record truncated while reading the {field}")]
    Truncated { field: &'static str },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A graph node in one of its three shapes.
///
/// The shape decides which fields exist: a [`Mass`](NodeRecord::Mass) record
/// has no adjacency and a [`Structure`](NodeRecord::Structure) record has no
/// rank, so asking for the missing field yields `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeRecord {
    Structure { id: NodeId, adjacency: Vec<NodeId> },
    Mass { id: NodeId, rank: f32 },
    Complete {
        id: NodeId,
        rank: f32,
        adjacency: Vec<NodeId>,
    },
}

impl NodeRecord {
    #[inline(always)]
    pub fn id(&self) -> NodeId {
        match self {
            NodeRecord::Structure { id, .. }
            | NodeRecord::Mass { id, .. }
            | NodeRecord::Complete { id, .. } => *id,
        }
    }

    #[inline(always)]
    pub fn variant(&self) -> Variant {
        match self {
            NodeRecord::Structure { .. } => Variant::Structure,
            NodeRecord::Mass { .. } => Variant::Mass,
            NodeRecord::Complete { .. } => Variant::Complete,
        }
    }

    /// Returns the log-probability carried by the record, if any.
    pub fn rank(&self) -> Option<f32> {
        match self {
            NodeRecord::Mass { rank, .. } | NodeRecord::Complete { rank, .. } => Some(*rank),
            NodeRecord::Structure { .. } => None,
        }
    }

    /// Returns the successors of the node, if the record carries them.
    pub fn adjacency(&self) -> Option<&[NodeId]> {
        match self {
            NodeRecord::Structure { adjacency, .. } | NodeRecord::Complete { adjacency, .. } => {
                Some(adjacency)
            }
            NodeRecord::Mass { .. } => None,
        }
    }

    /// Returns the number of bytes [`encode`](Self::encode) will write.
    pub fn encoded_len(&self) -> usize {
        match self {
            NodeRecord::Structure { adjacency, .. } => 1 + 4 + 4 + 4 * adjacency.len(),
            NodeRecord::Mass { .. } => 1 + 4 + 4,
            NodeRecord::Complete { adjacency, .. } => 1 + 4 + 4 + 4 + 4 * adjacency.len(),
        }
    }

    /// Writes the record to `writer`.
    pub fn encode(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writer.write_all(&[self.variant().tag()])?;
        writer.write_all(&self.id().to_be_bytes())?;
        if let Some(rank) = self.rank() {
            writer.write_all(&rank.to_bits().to_be_bytes())?;
        }
        if let Some(adjacency) = self.adjacency() {
            let count = u32::try_from(adjacency.len()).map_err(|_| {
                std::io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("Node {} has too many successors", self.id()),
                )
            })?;
            writer.write_all(&count.to_be_bytes())?;
            for succ in adjacency {
                writer.write_all(&succ.to_be_bytes())?;
            }
        }
        Ok(())
    }

    /// Reads the next record from `reader`.
    ///
    /// Returns `Ok(None)` if the reader is exhausted exactly at a record
    /// boundary. Running out of bytes inside a record is an error.
    pub fn decode(reader: &mut impl Read) -> Result<Option<Self>, DecodeError> {
        let Some(tag) = read_tag(reader)? else {
            return Ok(None);
        };
        let variant = Variant::from_tag(tag)?;
        let id = read_u32(reader, "node id")?;
        Ok(Some(match variant {
            Variant::Structure => NodeRecord::Structure {
                id,
                adjacency: read_adjacency(reader)?,
            },
            Variant::Mass => NodeRecord::Mass {
                id,
                rank: f32::from_bits(read_u32(reader, "rank")?),
            },
            Variant::Complete => {
                let rank = f32::from_bits(read_u32(reader, "rank")?);
                NodeRecord::Complete {
                    id,
                    rank,
                    adjacency: read_adjacency(reader)?,
                }
            }
        }))
    }

    /// Encodes the record into a fresh buffer.
    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        self.encode(&mut bytes)?;
        Ok(bytes)
    }

    /// Decodes exactly one record from `bytes`.
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, DecodeError> {
        let record = Self::decode(&mut bytes)?.ok_or(DecodeError::Truncated { field: "tag" })?;
        if !bytes.is_empty() {
            return Err(DecodeError::Io(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("{} trailing bytes after record", bytes.len()),
            )));
        }
        Ok(record)
    }
}

fn read_tag(reader: &mut impl Read) -> Result<Option<u8>, DecodeError> {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn read_u32(reader: &mut impl Read, field: &'static str) -> Result<u32, DecodeError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => DecodeError::Truncated { field },
        _ => DecodeError::Io(e),
    })?;
    Ok(u32::from_be_bytes(buf))
}

fn read_adjacency(reader: &mut impl Read) -> Result<Vec<NodeId>, DecodeError> {
    let count = read_u32(reader, "successor count")? as usize;
    // the count comes from the file, so we do not trust it for allocation
    let mut adjacency = Vec::with_capacity(count.min(1 << 16));
    for _ in 0..count {
        adjacency.push(read_u32(reader, "adjacency")?);
    }
    Ok(adjacency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let record = NodeRecord::Complete {
            id: 7,
            rank: -1.5,
            adjacency: vec![1, 2],
        };
        let bytes = record.to_bytes().unwrap();
        assert_eq!(bytes.len(), record.encoded_len());
        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[1..5], &[0, 0, 0, 7]);
        assert_eq!(&bytes[5..9], &(-1.5f32).to_bits().to_be_bytes());
        assert_eq!(&bytes[9..13], &[0, 0, 0, 2]);
        assert_eq!(&bytes[13..], &[0, 0, 0, 1, 0, 0, 0, 2]);

        let mass = NodeRecord::Mass { id: 1, rank: 0.0 }.to_bytes().unwrap();
        assert_eq!(mass, vec![1, 0, 0, 0, 1, 0, 0, 0, 0]);

        let structure = NodeRecord::Structure {
            id: 256,
            adjacency: vec![],
        }
        .to_bytes()
        .unwrap();
        assert_eq!(structure, vec![2, 0, 0, 1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_unknown_tag() {
        let err = NodeRecord::from_bytes(&[9, 0, 0, 0, 1]).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownTag { tag: 9 }));
    }

    #[test]
    fn test_truncated() {
        let bytes = NodeRecord::Complete {
            id: 3,
            rank: -0.5,
            adjacency: vec![4, 5, 6],
        }
        .to_bytes()
        .unwrap();
        let err = NodeRecord::from_bytes(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { field: "adjacency" }));
        let err = NodeRecord::from_bytes(&bytes[..3]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { field: "node id" }));
    }

    #[test]
    fn test_accessors() {
        let mass = NodeRecord::Mass { id: 2, rank: -3.0 };
        assert_eq!(mass.adjacency(), None);
        assert_eq!(mass.rank(), Some(-3.0));
        let structure = NodeRecord::Structure {
            id: 2,
            adjacency: vec![3, 3, 2],
        };
        assert_eq!(structure.rank(), None);
        assert_eq!(structure.adjacency(), Some(&[3, 3, 2][..]));
        assert_eq!(structure.variant(), Variant::Structure);
        assert_eq!(structure.variant().to_string(), "structure");
        assert_eq!(format!("{}/{}", Variant::Complete, Variant::Mass), "complete/mass");
    }
}
