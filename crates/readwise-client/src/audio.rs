//! Narration playback ownership.
//!
//! An [`AudioSlot`] holds at most one live player handle. Attaching a new
//! source releases the previous one first, and dropping the slot releases
//! whatever is attached.

use readwise_core::{Lang, Result};

/// Narration track of one chapter summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    pub book_id: String,
    pub lang: Lang,
    pub chapter: String,
    pub url: String,
}

/// Platform audio output.
pub trait AudioPlayer: Send {
    type Handle: Send;

    /// Begin playing `source`.
    fn attach(&mut self, source: &AudioSource) -> Result<Self::Handle>;

    /// Stop playback and free the handle.
    fn release(&mut self, handle: Self::Handle);

    /// True once playback of `handle` reached the end.
    fn has_ended(&mut self, _handle: &mut Self::Handle) -> bool {
        false
    }
}

/// Single-occupancy audio holder.
pub struct AudioSlot<P: AudioPlayer> {
    player: P,
    current: Option<(AudioSource, P::Handle)>,
}

impl<P: AudioPlayer> AudioSlot<P> {
    pub fn new(player: P) -> Self {
        Self {
            player,
            current: None,
        }
    }

    /// Play `source`, releasing any attached track first.
    pub fn attach(&mut self, source: AudioSource) -> Result<()> {
        self.release();
        let handle = self.player.attach(&source)?;
        self.current = Some((source, handle));
        Ok(())
    }

    pub fn release(&mut self) {
        if let Some((_, handle)) = self.current.take() {
            self.player.release(handle);
        }
    }

    pub fn current(&self) -> Option<&AudioSource> {
        self.current.as_ref().map(|(source, _)| source)
    }

    pub fn is_attached(&self) -> bool {
        self.current.is_some()
    }

    /// True when the attached track finished playing.
    pub fn has_ended(&mut self) -> bool {
        match self.current.as_mut() {
            Some((_, handle)) => self.player.has_ended(handle),
            None => false,
        }
    }

    pub fn player(&self) -> &P {
        &self.player
    }
}

impl<P: AudioPlayer> Drop for AudioSlot<P> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Sequential player over a list of narration tracks.
pub struct Playlist<P: AudioPlayer> {
    slot: AudioSlot<P>,
    tracks: Vec<AudioSource>,
    position: Option<usize>,
}

impl<P: AudioPlayer> Playlist<P> {
    pub fn new(player: P) -> Self {
        Self {
            slot: AudioSlot::new(player),
            tracks: Vec::new(),
            position: None,
        }
    }

    /// Replace the track list. Stops playback.
    pub fn set_tracks(&mut self, tracks: Vec<AudioSource>) {
        self.stop();
        self.tracks = tracks;
    }

    pub fn tracks(&self) -> &[AudioSource] {
        &self.tracks
    }

    /// Index of the playing track.
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn is_playing(&self) -> bool {
        self.slot.is_attached()
    }

    /// Play track `index`. Past the end of the list, playback stops.
    pub fn play(&mut self, index: usize) -> Result<()> {
        let Some(source) = self.tracks.get(index).cloned() else {
            self.stop();
            return Ok(());
        };
        self.slot.attach(source)?;
        self.position = Some(index);
        Ok(())
    }

    /// Advance after the current track ended.
    pub fn track_ended(&mut self) -> Result<()> {
        match self.position {
            Some(i) => self.play(i + 1),
            None => Ok(()),
        }
    }

    /// Advance if the current track has finished. Returns true while
    /// something is still playing.
    pub fn tick(&mut self) -> Result<bool> {
        if self.slot.has_ended() {
            self.track_ended()?;
        }
        Ok(self.is_playing())
    }

    pub fn stop(&mut self) {
        self.slot.release();
        self.position = None;
    }
}
