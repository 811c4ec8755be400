//! Scripted in-memory GPU driver and codec SDK.
//!
//! Every driver/SDK interaction is appended to a shared event log so tests
//! can assert construction counts, teardown order and submission params.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use zdepth_core::codec_traits::{
    CodecBackend, DecoderSettings, EncoderSettings, GpuDriver, HwDecoder, HwEncoder,
};
use zdepth_core::error::{CodecError, Result};
use zdepth_core::types::{
    BitstreamUnit, ContextHandle, DecodePacket, DeviceHandle, DeviceProperties, DevicePtr,
    EncoderInputFrame, HostToDeviceCopy, PicParams, PixelFormat, StreamGeometry, SubmitStream,
};

pub const CONTEXT: ContextHandle = ContextHandle(0xC0FFEE);

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Init,
    Retain,
    Release,
    Copy { dst: u64, dst_pitch: usize, rows: usize },
    EncoderCreated { id: u32, geometry: StreamGeometry },
    EncoderDropped { id: u32 },
    DecoderCreated { id: u32, geometry: StreamGeometry },
    DecoderDropped { id: u32 },
    Encode { id: u32, params: PicParams },
    EndEncode { id: u32 },
    Decode {
        id: u32,
        bytes: usize,
        end_of_picture: bool,
        stream: SubmitStream,
    },
}

pub enum EncodeStep {
    Units(Vec<BitstreamUnit>),
    Fail,
    Panic,
}

pub enum DecodeStep {
    Frames(usize),
    Fail,
}

pub struct Script {
    pub events: Vec<Event>,
    pub retained: i32,
    next_id: u32,
    pub fail_init: bool,
    pub fail_retain: bool,
    pub fail_encoder_create: bool,
    pub fail_decoder_create: bool,
    pub queue_full: bool,
    /// Extra bytes added to the width to form the device row pitch.
    pub pitch_padding: usize,
    pub encode_plan: VecDeque<EncodeStep>,
    pub flush_plan: VecDeque<Vec<BitstreamUnit>>,
    pub decode_plan: VecDeque<DecodeStep>,
    /// Device allocations keyed by base address.
    pub device_memory: HashMap<u64, Vec<u8>>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            retained: 0,
            next_id: 1,
            fail_init: false,
            fail_retain: false,
            fail_encoder_create: false,
            fail_decoder_create: false,
            queue_full: false,
            pitch_padding: 0,
            encode_plan: VecDeque::new(),
            flush_plan: VecDeque::new(),
            decode_plan: VecDeque::new(),
            device_memory: HashMap::new(),
        }
    }
}

impl Script {
    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn encoders_created(&self) -> usize {
        self.count(|e| matches!(e, Event::EncoderCreated { .. }))
    }

    pub fn decoders_created(&self) -> usize {
        self.count(|e| matches!(e, Event::DecoderCreated { .. }))
    }

    pub fn decode_submissions(&self) -> usize {
        self.count(|e| matches!(e, Event::Decode { .. }))
    }

    pub fn encode_params(&self) -> Vec<PicParams> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Encode { params, .. } => Some(*params),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events.iter().position(|e| e == event)
    }
}

pub type Shared = Arc<Mutex<Script>>;

fn lock(script: &Shared) -> MutexGuard<'_, Script> {
    script.lock().expect("script lock poisoned")
}

// ─── Driver ──────────────────────────────────────────────────────────────

pub struct MockDriver {
    script: Shared,
}

impl GpuDriver for MockDriver {
    fn init(&mut self) -> Result<()> {
        let mut s = lock(&self.script);
        s.events.push(Event::Init);
        if s.fail_init {
            return Err(CodecError::Driver("cuInit failed".into()));
        }
        Ok(())
    }

    fn device(&mut self, index: u32) -> Result<DeviceHandle> {
        Ok(DeviceHandle(index as i32))
    }

    fn properties(&mut self, _device: DeviceHandle) -> Result<DeviceProperties> {
        Ok(DeviceProperties {
            name: "Mock GPU".into(),
            total_memory_bytes: 8 << 30,
            compute_capability: (8, 6),
            multiprocessor_count: 46,
        })
    }

    fn retain_primary_context(&mut self, _device: DeviceHandle) -> Result<ContextHandle> {
        let mut s = lock(&self.script);
        if s.fail_retain {
            return Err(CodecError::Driver("cuDevicePrimaryCtxRetain failed".into()));
        }
        s.retained += 1;
        s.events.push(Event::Retain);
        Ok(CONTEXT)
    }

    fn release_primary_context(&mut self, _device: DeviceHandle) -> Result<()> {
        let mut s = lock(&self.script);
        s.retained -= 1;
        s.events.push(Event::Release);
        Ok(())
    }

    fn copy_host_to_device_2d(
        &mut self,
        context: ContextHandle,
        copy: &HostToDeviceCopy<'_>,
    ) -> Result<()> {
        assert_eq!(context, CONTEXT, "copy issued on a foreign context");
        let mut s = lock(&self.script);
        s.events.push(Event::Copy {
            dst: copy.dst.0,
            dst_pitch: copy.dst_pitch,
            rows: copy.rows,
        });
        let (base, memory) = s
            .device_memory
            .iter_mut()
            .find(|(base, mem)| copy.dst.0 >= **base && copy.dst.0 < **base + mem.len() as u64)
            .map(|(base, mem)| (*base, mem))
            .ok_or_else(|| CodecError::Driver("copy to unmapped device address".into()))?;
        let start = (copy.dst.0 - base) as usize;
        for row in 0..copy.rows {
            let src = &copy.src[row * copy.src_pitch..row * copy.src_pitch + copy.width_bytes];
            let dst = start + row * copy.dst_pitch;
            memory[dst..dst + copy.width_bytes].copy_from_slice(src);
        }
        Ok(())
    }
}

// ─── Encoder ─────────────────────────────────────────────────────────────

pub struct MockEncoder {
    id: u32,
    geometry: StreamGeometry,
    pitch: usize,
    base: u64,
    script: Shared,
}

impl HwEncoder for MockEncoder {
    fn next_input_frame(&mut self) -> Option<EncoderInputFrame> {
        if lock(&self.script).queue_full {
            return None;
        }
        Some(EncoderInputFrame {
            device_ptr: DevicePtr(self.base),
            pitch: self.pitch,
            chroma_offsets: vec![self.pitch * self.geometry.height() as usize],
            format: PixelFormat::Nv12,
        })
    }

    fn encode_frame(&mut self, params: &PicParams, units: &mut Vec<BitstreamUnit>) -> Result<()> {
        let step = {
            let mut s = lock(&self.script);
            s.events.push(Event::Encode {
                id: self.id,
                params: *params,
            });
            s.encode_plan.pop_front()
        };
        units.clear();
        match step {
            Some(EncodeStep::Units(planned)) => units.extend(planned),
            Some(EncodeStep::Fail) => return Err(CodecError::Encode("NV_ENC_ERR_GENERIC".into())),
            Some(EncodeStep::Panic) => panic!("NVENCException: encode picture failed"),
            None => units.push(vec![0, 0, 0, 1, self.id as u8, params.timestamp.0 as u8]),
        }
        Ok(())
    }

    fn end_encode(&mut self, units: &mut Vec<BitstreamUnit>) -> Result<()> {
        let planned = {
            let mut s = lock(&self.script);
            s.events.push(Event::EndEncode { id: self.id });
            s.flush_plan.pop_front()
        };
        units.clear();
        units.extend(planned.unwrap_or_else(|| vec![vec![0, 0, 1, 0x0B]]));
        Ok(())
    }
}

impl Drop for MockEncoder {
    fn drop(&mut self) {
        let mut s = lock(&self.script);
        s.device_memory.remove(&self.base);
        s.events.push(Event::EncoderDropped { id: self.id });
    }
}

// ─── Decoder ─────────────────────────────────────────────────────────────

/// Luma fill byte of the `index`-th picture returned by one submission.
pub fn luma_fill(index: usize) -> u8 {
    0x10 + index as u8
}

pub const CHROMA_FILL: u8 = 0x80;

pub struct MockDecoder {
    id: u32,
    geometry: StreamGeometry,
    frames: Vec<Vec<u8>>,
    script: Shared,
}

impl HwDecoder for MockDecoder {
    fn decode(&mut self, packet: &DecodePacket<'_>) -> Result<usize> {
        let step = {
            let mut s = lock(&self.script);
            s.events.push(Event::Decode {
                id: self.id,
                bytes: packet.data.len(),
                end_of_picture: packet.flags.end_of_picture,
                stream: packet.stream,
            });
            s.decode_plan.pop_front().unwrap_or(DecodeStep::Frames(1))
        };
        self.frames.clear();
        match step {
            DecodeStep::Fail => Err(CodecError::Decode("cuvidParseVideoData failed".into())),
            DecodeStep::Frames(n) => {
                for index in 0..n {
                    let mut picture = vec![luma_fill(index); self.geometry.luma_bytes()];
                    picture.resize(self.geometry.nv12_bytes(), CHROMA_FILL);
                    self.frames.push(picture);
                }
                Ok(n)
            }
        }
    }

    fn frame(&self, index: usize) -> Option<&[u8]> {
        self.frames.get(index).map(Vec::as_slice)
    }
}

impl Drop for MockDecoder {
    fn drop(&mut self) {
        lock(&self.script)
            .events
            .push(Event::DecoderDropped { id: self.id });
    }
}

// ─── Backend ─────────────────────────────────────────────────────────────

pub struct MockBackend {
    driver: MockDriver,
    script: Shared,
}

impl MockBackend {
    pub fn new() -> (Self, Shared) {
        let script: Shared = Arc::new(Mutex::new(Script::default()));
        (
            Self {
                driver: MockDriver {
                    script: script.clone(),
                },
                script: script.clone(),
            },
            script,
        )
    }
}

impl CodecBackend for MockBackend {
    type Driver = MockDriver;
    type Encoder = MockEncoder;
    type Decoder = MockDecoder;

    fn driver(&mut self) -> &mut MockDriver {
        &mut self.driver
    }

    fn create_encoder(
        &mut self,
        context: ContextHandle,
        settings: &EncoderSettings,
    ) -> Result<MockEncoder> {
        assert_eq!(context, CONTEXT);
        let mut s = lock(&self.script);
        if s.fail_encoder_create {
            return Err(CodecError::EncoderCreate("NV_ENC_ERR_OUT_OF_MEMORY".into()));
        }
        let id = s.allocate_id();
        let geometry = settings.geometry;
        let pitch = geometry.width() as usize + s.pitch_padding;
        let base = 0x1000_0000 * u64::from(id);
        s.device_memory
            .insert(base, vec![0; PixelFormat::Nv12.byte_size(geometry, pitch)]);
        s.events.push(Event::EncoderCreated { id, geometry });
        Ok(MockEncoder {
            id,
            geometry,
            pitch,
            base,
            script: self.script.clone(),
        })
    }

    fn create_decoder(
        &mut self,
        context: ContextHandle,
        settings: &DecoderSettings,
    ) -> Result<MockDecoder> {
        assert_eq!(context, CONTEXT);
        assert!(settings.host_output && settings.low_latency);
        assert!(settings.crop.is_none() && settings.resize.is_none());
        let mut s = lock(&self.script);
        if s.fail_decoder_create {
            return Err(CodecError::DecoderCreate("cuvidCreateDecoder failed".into()));
        }
        let id = s.allocate_id();
        s.events.push(Event::DecoderCreated {
            id,
            geometry: settings.geometry,
        });
        Ok(MockDecoder {
            id,
            geometry: settings.geometry,
            frames: Vec::new(),
            script: self.script.clone(),
        })
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────

pub fn geometry(width: u32, height: u32) -> StreamGeometry {
    StreamGeometry::new(width, height).expect("valid test geometry")
}

/// NV12 frame whose luma bytes count up and chroma bytes count down.
pub fn nv12_frame(geometry: StreamGeometry) -> Vec<u8> {
    let luma = geometry.luma_bytes();
    (0..geometry.nv12_bytes())
        .map(|i| {
            if i < luma {
                (i % 251) as u8
            } else {
                255 - ((i - luma) % 251) as u8
            }
        })
        .collect()
}
