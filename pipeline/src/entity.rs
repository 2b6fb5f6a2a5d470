//! A replicated participant.

use bitstream::{BitReader, BitWriter};
use codec::{pack_dirty, reset_all, unpack_dirty, CodecResult, DirtyMask, SyncFloat, SyncVar, Vec3};
use wire::{EntityMessage, PeerId};

const SLOT_X: u8 = 0;
const SLOT_Y: u8 = 1;
const SLOT_Z: u8 = 2;
const SLOT_HEADING: u8 = 3;

/// One connected peer's replicated state: a position and a heading in degrees.
#[derive(Debug, Clone)]
pub struct NetworkedEntity {
    id: PeerId,
    x: SyncFloat,
    y: SyncFloat,
    z: SyncFloat,
    heading: SyncFloat,
}

impl NetworkedEntity {
    /// Creates an entity at the origin.
    pub fn new(id: PeerId) -> CodecResult<Self> {
        Ok(Self {
            id,
            x: SyncFloat::with_slot(SLOT_X, 0.0)?,
            y: SyncFloat::with_slot(SLOT_Y, 0.0)?,
            z: SyncFloat::with_slot(SLOT_Z, 0.0)?,
            heading: SyncFloat::with_slot(SLOT_HEADING, 0.0)?,
        })
    }

    #[must_use]
    pub const fn id(&self) -> PeerId {
        self.id
    }

    #[must_use]
    pub fn position(&self) -> Vec3 {
        Vec3::new(*self.x.value(), *self.y.value(), *self.z.value())
    }

    #[must_use]
    pub fn heading(&self) -> f32 {
        *self.heading.value()
    }

    /// Returns `true` if any component changed.
    pub fn set_transform(&mut self, position: Vec3, heading: f32) -> bool {
        // Non-short-circuiting: every field must be updated.
        self.x.set(position.x) | self.y.set(position.y) | self.z.set(position.z) | self.heading.set(heading)
    }

    /// Applies a spawn or position update addressed to this entity.
    ///
    /// Returns `true` if the transform changed. Messages for other ids and
    /// destroys are ignored.
    pub fn apply(&mut self, message: &EntityMessage) -> bool {
        match *message {
            EntityMessage::Spawn { id, position, heading }
            | EntityMessage::PositionUpdate { id, position, heading }
                if id == self.id =>
            {
                self.set_transform(position, heading)
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.vars().iter().any(|var| var.is_dirty())
    }

    pub fn reset_dirty(&mut self) {
        reset_all(&mut self.vars_mut());
    }

    #[must_use]
    pub fn spawn_message(&self) -> EntityMessage {
        EntityMessage::Spawn {
            id: self.id,
            position: self.position(),
            heading: self.heading(),
        }
    }

    #[must_use]
    pub fn update_message(&self) -> EntityMessage {
        EntityMessage::PositionUpdate {
            id: self.id,
            position: self.position(),
            heading: self.heading(),
        }
    }

    #[must_use]
    pub const fn destroy_message(&self) -> EntityMessage {
        EntityMessage::Destroy { id: self.id }
    }

    /// Writes only the fields changed since the last reset.
    pub fn pack_delta(&self, writer: &mut BitWriter) -> CodecResult<DirtyMask> {
        pack_dirty(&self.vars(), writer)
    }

    /// Applies a delta written by [`pack_delta`](Self::pack_delta). Returns the
    /// slots whose value changed.
    pub fn unpack_delta(&mut self, reader: &mut BitReader<'_>) -> CodecResult<DirtyMask> {
        unpack_dirty(&mut self.vars_mut(), reader)
    }

    fn vars(&self) -> [&dyn SyncVar; 4] {
        [&self.x, &self.y, &self.z, &self.heading]
    }

    fn vars_mut(&mut self) -> [&mut dyn SyncVar; 4] {
        [&mut self.x, &mut self.y, &mut self.z, &mut self.heading]
    }
}
