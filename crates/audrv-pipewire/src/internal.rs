use std::cell::RefCell;
use std::mem::size_of;
use std::rc::Rc;
use std::slice;

use audrv_native::{PcmFormat, PcmSampleFormat, PlayerDesc};
use pipewire::channel::{Receiver, Sender};
use pipewire::context::Context;
use pipewire::core::Core;
use pipewire::keys::*;
use pipewire::main_loop::MainLoop;
use pipewire::properties::properties;
use pipewire::spa::param::audio::{AudioFormat, AudioInfoRaw, MAX_CHANNELS};
use pipewire::spa::pod::serialize::PodSerializer;
use pipewire::spa::pod::{Object, Pod, Value};
use pipewire::spa::sys::*;
use pipewire::spa::utils::Direction;
use pipewire::stream::{Stream, StreamFlags, StreamListener};
use rtrb::Consumer;
use slotmap::SlotMap;

use crate::{Error, Result};

slotmap::new_key_type! {
    pub struct TargetId;
    pub struct PlayerId;
}

pub enum Message {
    CreateTarget {
        sender: oneshot::Sender<Result<TargetId>>,
        device: Option<String>,
    },
    RealizeTarget {
        sender: oneshot::Sender<Result<()>>,
        id: TargetId,
    },
    DestroyTarget {
        id: TargetId,
    },
    CreatePlayer {
        sender: oneshot::Sender<Result<PlayerId>>,
        target: TargetId,
        desc: PlayerDesc,
        consumer: Consumer<f32>,
    },
    RealizePlayer {
        sender: oneshot::Sender<Result<()>>,
        id: PlayerId,
    },
    SetPlayerActive {
        sender: oneshot::Sender<Result<()>>,
        id: PlayerId,
        active: bool,
    },
    DestroyPlayer {
        id: PlayerId,
    },
    Terminate,
}

#[derive(Clone)]
pub struct Handle {
    sender: Sender<Message>,
}

impl Handle {
    pub fn new() -> (Handle, Receiver<Message>) {
        let (sender, receiver) = pipewire::channel::channel();
        (Handle { sender }, receiver)
    }

    fn send(&self, message: Message) -> Result<()> {
        self.sender.send(message).map_err(|_| Error::ThreadCrashed)
    }

    fn send_recv<T>(&self, recv: oneshot::Receiver<Result<T>>, message: Message) -> Result<T> {
        self.send(message)?;
        recv.recv().map_err(|_| Error::ThreadCrashed)?
    }

    pub fn terminate(&self) -> Result<()> {
        self.send(Message::Terminate)
    }

    pub fn create_target(&self, device: Option<String>) -> Result<TargetId> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::CreateTarget { sender, device })
    }

    pub fn realize_target(&self, id: TargetId) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::RealizeTarget { sender, id })
    }

    pub fn destroy_target(&self, id: TargetId) -> Result<()> {
        self.send(Message::DestroyTarget { id })
    }

    pub fn create_player(
        &self,
        target: TargetId,
        desc: PlayerDesc,
        consumer: Consumer<f32>,
    ) -> Result<PlayerId> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(
            receiver,
            Message::CreatePlayer {
                sender,
                target,
                desc,
                consumer,
            },
        )
    }

    pub fn realize_player(&self, id: PlayerId) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::RealizePlayer { sender, id })
    }

    pub fn set_player_active(&self, id: PlayerId, active: bool) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::SetPlayerActive { sender, id, active })
    }

    pub fn destroy_player(&self, id: PlayerId) -> Result<()> {
        self.send(Message::DestroyPlayer { id })
    }
}

pub struct PwThread {
    main_loop: MainLoop,
    core: Core,

    targets: RefCell<SlotMap<TargetId, Target>>,
    players: RefCell<SlotMap<PlayerId, Player>>,
}

struct Target {
    device: Option<String>,
    realized: bool,
}

struct Player {
    format: PcmFormat,
    stream: Stream,
    _listener: StreamListener<()>,
}

impl PwThread {
    pub fn new(app_name: &str, server: Option<&str>) -> Result<PwThread> {
        let main_loop = MainLoop::new(None)?;
        let context = Context::new(&main_loop)?;

        let mut props = properties! {
            *APP_NAME => app_name,
        };
        if let Some(server) = server {
            props.insert(*REMOTE_NAME, server);
        }

        let core = context.connect(Some(props))?;

        Ok(PwThread {
            main_loop,
            core,
            targets: Default::default(),
            players: Default::default(),
        })
    }

    pub fn run(self, receiver: Receiver<Message>) {
        let self_rc = Rc::new(self);

        let main_loop = self_rc.main_loop.clone();
        let _receiver = receiver.attach(main_loop.loop_(), move |msg| self_rc.handle_message(msg));

        main_loop.run();
    }

    fn handle_message(&self, message: Message) {
        match message {
            Message::CreateTarget { sender, device } => {
                let _ = sender.send(Ok(self.create_target(device)));
            }
            Message::RealizeTarget { sender, id } => {
                let _ = sender.send(self.realize_target(id));
            }
            Message::DestroyTarget { id } => {
                self.targets.borrow_mut().remove(id);
            }
            Message::CreatePlayer {
                sender,
                target,
                desc,
                consumer,
            } => {
                let _ = sender.send(self.create_player(target, desc, consumer));
            }
            Message::RealizePlayer { sender, id } => {
                let _ = sender.send(self.realize_player(id));
            }
            Message::SetPlayerActive { sender, id, active } => {
                let _ = sender.send(self.set_player_active(id, active));
            }
            Message::DestroyPlayer { id } => {
                self.players.borrow_mut().remove(id);
            }
            Message::Terminate => self.main_loop.quit(),
        }
    }

    fn create_target(&self, device: Option<String>) -> TargetId {
        self.targets.borrow_mut().insert(Target {
            device,
            realized: false,
        })
    }

    fn realize_target(&self, id: TargetId) -> Result<()> {
        let mut targets = self.targets.borrow_mut();
        let target = targets.get_mut(id).ok_or(Error::InvalidId)?;
        target.realized = true;
        Ok(())
    }

    fn create_player(
        &self,
        target: TargetId,
        desc: PlayerDesc,
        mut consumer: Consumer<f32>,
    ) -> Result<PlayerId> {
        let device = {
            let targets = self.targets.borrow();
            let target = targets.get(target).ok_or(Error::InvalidId)?;
            if !target.realized {
                return Err(Error::NotRealized);
            }
            target.device.clone()
        };

        let format = desc.source.format;
        let num_channels = format.channels as usize;
        let sample_rate = format.sample_rate;
        let frames_per_buffer = desc.source.frames_per_buffer;

        let mut props = properties! {
            *MEDIA_TYPE => "Audio",
            *MEDIA_ROLE => desc.media_role.as_str(),
            *MEDIA_CATEGORY => "Playback",
            *AUDIO_CHANNELS => num_channels.to_string().as_bytes(),
        };
        if let Some(latency) = desc.latency {
            props.insert(*NODE_LATENCY, format!("{latency}/{sample_rate}"));
        }
        if let Some(device) = device {
            props.insert("target.object", device);
        }

        let stream = Stream::new(&self.core, "audrv", props)?;

        let listener = stream
            .add_local_listener::<()>()
            .process(move |stream, _| {
                let Some(mut buffer) = stream.dequeue_buffer() else {
                    return;
                };

                for data in buffer.datas_mut() {
                    let Some(samples) = data.data() else {
                        continue;
                    };

                    let samples = transmute_out_buffer(samples);
                    let len = fill_cycle(&mut consumer, samples, num_channels, frames_per_buffer);

                    let chunk_size = (len * size_of::<f32>()) as u32;
                    let chunk_stride = (num_channels * size_of::<f32>()) as i32;

                    let chunk = data.chunk_mut();
                    *chunk.offset_mut() = 0;
                    *chunk.size_mut() = chunk_size;
                    *chunk.stride_mut() = chunk_stride;
                }
            })
            .register()?;

        let id = self.players.borrow_mut().insert(Player {
            format,
            stream,
            _listener: listener,
        });

        Ok(id)
    }

    fn realize_player(&self, id: PlayerId) -> Result<()> {
        let players = self.players.borrow();
        let player = players.get(id).ok_or(Error::InvalidId)?;

        let audio_info = serialize_audio_info(&player.format)?;
        let pod = Pod::from_bytes(&audio_info).ok_or(Error::InvalidPod)?;
        let mut params = [pod];

        player.stream.connect(
            Direction::Output,
            None,
            StreamFlags::AUTOCONNECT
                | StreamFlags::MAP_BUFFERS
                | StreamFlags::RT_PROCESS
                | StreamFlags::INACTIVE,
            &mut params,
        )?;

        Ok(())
    }

    fn set_player_active(&self, id: PlayerId, active: bool) -> Result<()> {
        let players = self.players.borrow();
        let player = players.get(id).ok_or(Error::InvalidId)?;
        player.stream.set_active(active)?;
        Ok(())
    }
}

/// Fills one period at the start of the mapped buffer and returns the number
/// of samples the cycle carries. The graph may map more than a period when
/// the latency is not pinned to it; the rest of the mapping is left unused.
fn fill_cycle(
    consumer: &mut Consumer<f32>,
    samples: &mut [f32],
    num_channels: usize,
    frames_per_buffer: usize,
) -> usize {
    let len = samples.len().min(frames_per_buffer * num_channels);
    let len = len - len % num_channels;
    drain_into(consumer, &mut samples[..len], num_channels);
    len
}

/// Copies whole frames from the queue into `samples` and pads the rest with
/// silence.
fn drain_into(consumer: &mut Consumer<f32>, samples: &mut [f32], num_channels: usize) {
    let available = consumer.slots().min(samples.len());
    let available = available - available % num_channels;

    if let Ok(chunk) = consumer.read_chunk(available) {
        let (first, second) = chunk.as_slices();
        samples[..first.len()].copy_from_slice(first);
        samples[first.len()..available].copy_from_slice(second);
        chunk.commit_all();
    }

    samples[available..].fill(0.0);
}

fn serialize_audio_info(format: &PcmFormat) -> Result<Vec<u8>> {
    let num_channels = format.channels as usize;
    if num_channels > MAX_CHANNELS {
        return Err(Error::TooManyChannels);
    }

    let mut audio_info = AudioInfoRaw::new();
    audio_info.set_format(match format.sample_format {
        PcmSampleFormat::F32Le => AudioFormat::F32LE,
    });
    audio_info.set_rate(format.sample_rate);
    audio_info.set_channels(format.channels);

    let mut position = [0; MAX_CHANNELS];
    match num_channels {
        1 => position[0] = SPA_AUDIO_CHANNEL_MONO,
        2 => {
            position[0] = SPA_AUDIO_CHANNEL_FL;
            position[1] = SPA_AUDIO_CHANNEL_FR;
        }
        _ => {
            for (i, pos) in position.iter_mut().take(num_channels).enumerate() {
                *pos = SPA_AUDIO_CHANNEL_START_Aux + i as u32;
            }
        }
    }
    audio_info.set_position(position);

    let values = PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &Value::Object(Object {
            type_: SPA_TYPE_OBJECT_Format,
            id: SPA_PARAM_EnumFormat,
            properties: audio_info.into(),
        }),
    )?;

    Ok(values.0.into_inner())
}

fn transmute_out_buffer(data: &mut [u8]) -> &mut [f32] {
    assert!(data.len() % size_of::<f32>() == 0);
    let len = data.len() / size_of::<f32>();
    let ptr = data.as_mut_ptr() as *mut f32;
    assert!(ptr.is_aligned());
    unsafe { slice::from_raw_parts_mut(ptr, len) }
}

#[cfg(test)]
mod tests {
    use rtrb::RingBuffer;

    use super::*;

    #[test]
    fn drain_pads_with_silence() {
        let (mut producer, mut consumer) = RingBuffer::new(8);
        for v in [1.0, 2.0, 3.0] {
            producer.push(v).unwrap();
        }

        let mut out = [9.0; 6];
        drain_into(&mut consumer, &mut out, 2);

        // The odd sample stays queued until its frame is complete.
        assert_eq!(out, [1.0, 2.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(consumer.slots(), 1);
    }

    #[test]
    fn cycle_is_one_period() {
        let (mut producer, mut consumer) = RingBuffer::new(2 * 64 * 2);
        for i in 0..256 {
            producer.push(i as f32).unwrap();
        }

        let mut mapped = vec![-1.0; 2048];
        let len = fill_cycle(&mut consumer, &mut mapped, 2, 64);

        assert_eq!(len, 128);
        assert!(mapped[..128].iter().enumerate().all(|(i, &s)| s == i as f32));
        assert!(mapped[128..].iter().all(|&s| s == -1.0));
        assert_eq!(consumer.slots(), 128);

        let len = fill_cycle(&mut consumer, &mut mapped, 2, 64);
        assert_eq!(len, 128);
        assert_eq!(mapped[0], 128.0);
        assert_eq!(consumer.slots(), 0);
    }

    #[test]
    fn short_mapping_keeps_whole_frames() {
        let (mut producer, mut consumer) = RingBuffer::new(16);
        for i in 0..16 {
            producer.push(i as f32).unwrap();
        }

        let mut mapped = [0.0; 5];
        assert_eq!(fill_cycle(&mut consumer, &mut mapped, 2, 64), 4);
        assert_eq!(mapped, [0.0, 1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn drain_wraps_around() {
        let (mut producer, mut consumer) = RingBuffer::new(4);
        for v in [0.0, 0.0, 0.0] {
            producer.push(v).unwrap();
        }
        let mut skip = [0.0; 2];
        drain_into(&mut consumer, &mut skip, 2);

        for v in [1.0, 2.0, 3.0, 4.0] {
            let _ = producer.push(v);
        }

        let mut out = [0.0; 4];
        drain_into(&mut consumer, &mut out, 2);
        assert_eq!(out, [0.0, 1.0, 2.0, 3.0]);
    }
}
