use crate::stage::Position;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SLOT_COUNT: usize = 6;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("no position recorded in slot {0}")]
    NoPositionRecorded(usize),
    #[error("slot {0} out of range")]
    SlotOutOfRange(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Saved stage positions for "go back to position N"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionRegistry {
    slots: [Option<Position>; SLOT_COUNT],
}

impl PositionRegistry {
    pub fn new() -> PositionRegistry {
        PositionRegistry::default()
    }

    fn check(index: usize) -> Result<()> {
        if index < SLOT_COUNT {
            Ok(())
        } else {
            Err(Error::SlotOutOfRange(index))
        }
    }

    /// Stores `position` in slot `index`, replacing whatever was there
    pub fn record(&mut self, index: usize, position: Position) -> Result<()> {
        Self::check(index)?;
        self.slots[index] = Some(position);
        Ok(())
    }

    pub fn recall(&self, index: usize) -> Result<Position> {
        Self::check(index)?;
        self.slots[index].ok_or(Error::NoPositionRecorded(index))
    }

    pub fn clear(&mut self, index: usize) -> Result<()> {
        Self::check(index)?;
        self.slots[index] = None;
        Ok(())
    }

    /// Recorded slots as (index, position)
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Position)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|p| (i, p)))
    }
}

#[test]
fn test_record_recall() {
    let mut registry = PositionRegistry::new();
    registry.record(2, Position::new(1.0, 2.0, 3.0)).unwrap();
    assert_eq!(registry.recall(2), Ok(Position::new(1.0, 2.0, 3.0)));
    assert_eq!(registry.recall(5), Err(Error::NoPositionRecorded(5)));

    registry.record(2, Position::new(4.0, 5.0, 6.0)).unwrap();
    assert_eq!(registry.recall(2), Ok(Position::new(4.0, 5.0, 6.0)));

    registry.clear(2).unwrap();
    assert_eq!(registry.recall(2), Err(Error::NoPositionRecorded(2)));
}

#[test]
fn test_slot_out_of_range() {
    let mut registry = PositionRegistry::new();
    assert_eq!(
        registry.record(SLOT_COUNT, Position::new(0.0, 0.0, 0.0)),
        Err(Error::SlotOutOfRange(SLOT_COUNT))
    );
    assert_eq!(registry.recall(7), Err(Error::SlotOutOfRange(7)));
}

#[test]
fn test_registry_json() {
    let mut registry = PositionRegistry::new();
    registry.record(0, Position::new(10.0, 20.0, 1.5)).unwrap();
    registry.record(4, Position::new(-1.0, 0.0, 0.0)).unwrap();
    let json = serde_json::to_string(&registry).unwrap();
    let restored: PositionRegistry = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, registry);
    let recorded: Vec<usize> = restored.iter().map(|(i, _)| i).collect();
    assert_eq!(recorded, vec![0, 4]);
}
