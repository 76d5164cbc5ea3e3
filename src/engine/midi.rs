//! MIDI events carried alongside each audio block
//!
//! Stages receive the block's MIDI by mutable reference and may consume or
//! append events; the chain itself never inspects them.

use smallvec::SmallVec;

/// A short MIDI message positioned within the current block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    /// Offset in frames from the start of the block
    pub sample_offset: u32,
    /// Raw status and data bytes
    pub data: [u8; 3],
}

impl MidiEvent {
    pub fn new(sample_offset: u32, data: [u8; 3]) -> Self {
        Self {
            sample_offset,
            data,
        }
    }

    pub fn note_on(sample_offset: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(sample_offset, [0x90 | (channel & 0x0f), note, velocity])
    }

    pub fn note_off(sample_offset: u32, channel: u8, note: u8) -> Self {
        Self::new(sample_offset, [0x80 | (channel & 0x0f), note, 0])
    }
}

/// Events for one block, kept on the stack for the typical case
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MidiBuffer {
    events: SmallVec<[MidiEvent; 16]>,
}

impl MidiBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event, keeping events ordered by offset
    pub fn push(&mut self, event: MidiEvent) {
        let pos = self
            .events
            .iter()
            .position(|e| e.sample_offset > event.sample_offset)
            .unwrap_or(self.events.len());
        self.events.insert(pos, event);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MidiEvent> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_keeps_offset_order() {
        let mut midi = MidiBuffer::new();
        midi.push(MidiEvent::note_on(32, 0, 60, 100));
        midi.push(MidiEvent::note_off(8, 0, 60));
        midi.push(MidiEvent::note_on(16, 1, 64, 90));

        let offsets: Vec<u32> = midi.iter().map(|e| e.sample_offset).collect();
        assert_eq!(offsets, vec![8, 16, 32]);
    }

    #[test]
    fn test_note_on_status_byte() {
        let event = MidiEvent::note_on(0, 3, 60, 127);
        assert_eq!(event.data, [0x93, 60, 127]);
    }
}
