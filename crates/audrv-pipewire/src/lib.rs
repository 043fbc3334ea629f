mod error;
mod internal;

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use audrv_native::{
    BufferQueue, EngineOptions, NativeBackend, PlayInterface, PlayState, PlayerDesc,
};
use crossbeam_utils::Backoff;
use pipewire::channel::Receiver;
use rtrb::{Producer, RingBuffer};

pub use crate::error::{Error, Result};
use crate::internal::{Handle, Message, PlayerId, PwThread, TargetId};

/// How long `enqueue` waits for the stream to drain before giving up.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// [`NativeBackend`] on top of PipeWire.
///
/// The engine is a dedicated thread running the PipeWire main loop; output
/// mixes and players live on that thread and are driven through messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct Backend;

impl Backend {
    pub fn new() -> Backend {
        Backend
    }
}

pub struct Engine {
    options: EngineOptions,
    handle: Handle,
    receiver: Option<Receiver<Message>>,
    thread: Option<JoinHandle<()>>,
}

impl Engine {
    fn realized_handle(&self) -> Result<&Handle> {
        match self.thread {
            Some(_) => Ok(&self.handle),
            None => Err(Error::NotRealized),
        }
    }
}

pub struct OutputMix {
    id: TargetId,
    handle: Handle,
}

pub struct Player {
    id: PlayerId,
    handle: Handle,
    producer: Option<Producer<f32>>,
}

pub struct Play {
    id: PlayerId,
    handle: Handle,
}

pub struct Queue {
    producer: Producer<f32>,
    stall_timeout: Duration,
}

impl Queue {
    fn new(producer: Producer<f32>, stall_timeout: Duration) -> Queue {
        Queue {
            producer,
            stall_timeout,
        }
    }
}

impl NativeBackend for Backend {
    type Error = Error;
    type Engine = Engine;
    type OutputMix = OutputMix;
    type Player = Player;
    type Play = Play;
    type BufferQueue = Queue;

    fn name(&self) -> &'static str {
        "pipewire"
    }

    fn create_engine(&self, options: &EngineOptions) -> Result<Engine> {
        let (handle, receiver) = Handle::new();
        Ok(Engine {
            options: options.clone(),
            handle,
            receiver: Some(receiver),
            thread: None,
        })
    }

    fn realize_engine(&self, engine: &mut Engine) -> Result<()> {
        let receiver = engine.receiver.take().ok_or(Error::ThreadCrashed)?;
        let app_name = engine.options.app_name.clone();
        let server = engine.options.server.clone();

        let (err_sender, err_receiver) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name("pipewire-driver".into())
            .spawn(
                move || match PwThread::new(&app_name, server.as_deref()) {
                    Ok(thread) => {
                        let _ = err_sender.send(None);
                        thread.run(receiver);
                    }
                    Err(e) => {
                        let _ = err_sender.send(Some(e));
                    }
                },
            )
            .map_err(Error::ThreadSpawn)?;

        match err_receiver.recv() {
            Ok(None) => {
                engine.thread = Some(thread);
                Ok(())
            }
            Ok(Some(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::ThreadCrashed)
            }
        }
    }

    fn create_output_mix(&self, engine: &Engine, device: Option<&str>) -> Result<OutputMix> {
        let handle = engine.realized_handle()?;
        let id = handle.create_target(device.map(Into::into))?;
        Ok(OutputMix {
            id,
            handle: handle.clone(),
        })
    }

    fn realize_output_mix(&self, output_mix: &mut OutputMix) -> Result<()> {
        output_mix.handle.realize_target(output_mix.id)
    }

    fn create_player(
        &self,
        engine: &Engine,
        output_mix: &OutputMix,
        desc: &PlayerDesc,
    ) -> Result<Player> {
        let handle = engine.realized_handle()?;

        let source = &desc.source;
        let block_len = source.frames_per_buffer * source.format.channels as usize;
        let (producer, consumer) = RingBuffer::new(source.queue_depth * block_len);

        let id = handle.create_player(output_mix.id, desc.clone(), consumer)?;

        Ok(Player {
            id,
            handle: handle.clone(),
            producer: Some(producer),
        })
    }

    fn realize_player(&self, player: &mut Player) -> Result<()> {
        player.handle.realize_player(player.id)
    }

    fn play_interface(&self, player: &mut Player) -> Result<Play> {
        Ok(Play {
            id: player.id,
            handle: player.handle.clone(),
        })
    }

    fn buffer_queue(&self, player: &mut Player) -> Result<Queue> {
        let producer = player.producer.take().ok_or(Error::QueueTaken)?;
        Ok(Queue::new(producer, STALL_TIMEOUT))
    }

    fn destroy_player(&self, player: Player) {
        let _ = player.handle.destroy_player(player.id);
    }

    fn destroy_output_mix(&self, output_mix: OutputMix) {
        let _ = output_mix.handle.destroy_target(output_mix.id);
    }

    fn destroy_engine(&self, engine: Engine) {
        let Some(thread) = engine.thread else {
            return;
        };

        let _ = engine.handle.terminate();
        if thread.join().is_err() {
            tracing::error!("pipewire thread panicked");
        }
    }
}

impl PlayInterface for Play {
    type Error = Error;

    fn set_play_state(&mut self, state: PlayState) -> Result<()> {
        self.handle
            .set_player_active(self.id, state == PlayState::Playing)
    }
}

impl BufferQueue for Queue {
    type Error = Error;

    fn enqueue(&mut self, block: &[f32]) -> Result<()> {
        if block.len() > self.producer.buffer().capacity() {
            return Err(Error::BlockTooLarge);
        }

        let backoff = Backoff::new();
        let deadline = Instant::now() + self.stall_timeout;

        while self.producer.slots() < block.len() {
            if self.producer.is_abandoned() {
                return Err(Error::ThreadCrashed);
            }

            if Instant::now() > deadline {
                return Err(Error::QueueStalled);
            }

            if backoff.is_completed() {
                std::thread::sleep(Duration::from_micros(250));
            } else {
                backoff.snooze();
            }
        }

        let mut chunk = self
            .producer
            .write_chunk(block.len())
            .map_err(|_| Error::QueueStalled)?;
        let (first, second) = chunk.as_mut_slices();
        let (head, tail) = block.split_at(first.len());
        first.copy_from_slice(head);
        second.copy_from_slice(tail);
        chunk.commit_all();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use rtrb::RingBuffer;

    use super::*;

    #[test]
    fn oversized_block() {
        let (producer, _consumer) = RingBuffer::new(8);
        let mut queue = Queue::new(producer, STALL_TIMEOUT);

        assert!(matches!(queue.enqueue(&[0.0; 9]), Err(Error::BlockTooLarge)));
        assert!(queue.enqueue(&[0.0; 8]).is_ok());
    }

    #[test]
    fn abandoned_consumer() {
        let (producer, consumer) = RingBuffer::new(4);
        let mut queue = Queue::new(producer, STALL_TIMEOUT);

        queue.enqueue(&[1.0; 4]).unwrap();
        drop(consumer);

        assert!(matches!(queue.enqueue(&[1.0; 4]), Err(Error::ThreadCrashed)));
    }

    #[test]
    fn full_ring_stalls() {
        let (producer, _consumer) = RingBuffer::new(4);
        let mut queue = Queue::new(producer, Duration::from_millis(20));

        queue.enqueue(&[1.0; 4]).unwrap();

        let start = Instant::now();
        assert!(matches!(queue.enqueue(&[1.0; 2]), Err(Error::QueueStalled)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn waits_for_space_and_wraps() {
        let (producer, mut consumer) = RingBuffer::new(6);
        let mut queue = Queue::new(producer, STALL_TIMEOUT);

        queue.enqueue(&[1.0, 2.0, 3.0, 4.0]).unwrap();

        let reader = std::thread::spawn(move || {
            let mut out = Vec::new();
            while out.len() < 8 {
                match consumer.pop() {
                    Ok(v) => out.push(v),
                    Err(_) => std::thread::sleep(Duration::from_millis(1)),
                }
            }
            out
        });

        // Needs the reader to free two slots, and the write crosses the end
        // of the ring.
        queue.enqueue(&[5.0, 6.0, 7.0, 8.0]).unwrap();

        assert_eq!(
            reader.join().unwrap(),
            [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]
        );
    }
}
