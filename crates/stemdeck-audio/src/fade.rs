//! Linear fade-out of the channels that are sounding.

use tracing::trace;

use crate::pool::ChannelPool;

/// A fade-out in progress.
///
/// Each tick lowers every active channel by `rate * unscaled_delta`. A channel that
/// reaches zero is stopped and left alone from then on. Dropping a `Crossfade`
/// cancels it without completing.
#[derive(Debug)]
pub struct Crossfade {
    rate: f32,
    active: Vec<usize>,
    completed: bool,
}

impl Crossfade {
    /// Start fading every channel of the pool that is playing right now.
    ///
    /// Channels start from whatever volume they have, so a fade replacing an
    /// earlier one continues from the partially faded level.
    pub fn start(pool: &ChannelPool, rate: f32) -> Self {
        let active = pool
            .channels()
            .iter()
            .filter(|c| c.is_playing())
            .map(crate::pool::ChannelHandle::index)
            .collect();
        Self {
            rate: rate.max(f32::EPSILON),
            active,
            completed: false,
        }
    }

    /// Channels still being faded.
    pub fn active_channels(&self) -> &[usize] {
        &self.active
    }

    pub const fn is_completed(&self) -> bool {
        self.completed
    }

    /// Advance the fade by one frame.
    ///
    /// Returns true exactly once, on the tick where the last channel stops.
    pub fn tick(&mut self, pool: &mut ChannelPool, unscaled_delta: f64) -> bool {
        if self.completed {
            return false;
        }

        let step = self.rate * unscaled_delta.max(0.0) as f32;
        self.active.retain(|&index| {
            let Some(channel) = pool.get_mut(index) else {
                return false;
            };
            if !channel.is_playing() {
                channel.set_volume(0.0);
                return false;
            }

            let volume = channel.volume() - step;
            if volume <= 0.0 {
                channel.set_volume(0.0);
                channel.stop();
                trace!("Fade stopped channel {index}");
                false
            } else {
                channel.set_volume(volume);
                true
            }
        });

        self.completed = self.active.is_empty();
        self.completed
    }
}
