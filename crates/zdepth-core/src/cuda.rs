//! [`GpuDriver`] implementation over the CUDA driver API (`cudarc`).
//!
//! `cudarc` resolves `libcuda` lazily on first use, so this builds on hosts
//! without a CUDA toolkit.  A missing driver library surfaces as a
//! [`CodecError::Driver`] from [`GpuDriver::init`] instead of a panic.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};

use cudarc::driver::{result, sys};
use tracing::{debug, info};

use crate::codec_traits::GpuDriver;
use crate::error::{CodecError, Result};
use crate::types::{ContextHandle, DeviceHandle, DeviceProperties, HostToDeviceCopy};

const DEVICE_NAME_CAPACITY: usize = 256;

/// CUDA driver API.  Stateless apart from the one-time init flag.
#[derive(Debug, Default)]
pub struct CudaDriver {
    initialized: bool,
}

impl CudaDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of visible CUDA devices.
    pub fn device_count(&mut self) -> Result<u32> {
        self.init()?;
        let count = result::device::get_count()?;
        Ok(count.max(0) as u32)
    }

    fn device_name(device: DeviceHandle) -> Result<String> {
        let mut buf = [0 as c_char; DEVICE_NAME_CAPACITY];
        // SAFETY: buf is writable for DEVICE_NAME_CAPACITY bytes and the
        // driver NUL-terminates within that length.
        unsafe {
            sys::lib()
                .cuDeviceGetName(buf.as_mut_ptr(), DEVICE_NAME_CAPACITY as c_int, device.0)
                .result()?;
        }
        // SAFETY: NUL-terminated by the driver (buffer zero-initialized).
        let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
        Ok(name.to_string_lossy().into_owned())
    }

    fn attribute(device: DeviceHandle, attrib: sys::CUdevice_attribute_enum) -> Result<i32> {
        // SAFETY: device was produced by cuDeviceGet.
        Ok(unsafe { result::device::get_attribute(device.0, attrib)? })
    }
}

impl GpuDriver for CudaDriver {
    fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let outcome = catch_unwind(AssertUnwindSafe(result::init)).map_err(|_| {
            CodecError::Driver(
                "CUDA driver library could not be loaded; ensure the NVIDIA driver is installed \
and libcuda is on the loader path"
                    .into(),
            )
        })?;
        outcome?;
        self.initialized = true;
        debug!("CUDA driver initialized");
        Ok(())
    }

    fn device(&mut self, index: u32) -> Result<DeviceHandle> {
        let ordinal = c_int::try_from(index)
            .map_err(|_| CodecError::Driver(format!("device ordinal {index} out of range")))?;
        Ok(DeviceHandle(result::device::get(ordinal)?))
    }

    fn properties(&mut self, device: DeviceHandle) -> Result<DeviceProperties> {
        use sys::CUdevice_attribute_enum as Attr;

        let name = Self::device_name(device)?;
        // SAFETY: device was produced by cuDeviceGet.
        let total_memory_bytes = unsafe { result::device::total_mem(device.0)? };
        let major = Self::attribute(device, Attr::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR)?;
        let minor = Self::attribute(device, Attr::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR)?;
        let multiprocessor_count =
            Self::attribute(device, Attr::CU_DEVICE_ATTRIBUTE_MULTIPROCESSOR_COUNT)?;

        Ok(DeviceProperties {
            name,
            total_memory_bytes,
            compute_capability: (major, minor),
            multiprocessor_count,
        })
    }

    fn retain_primary_context(&mut self, device: DeviceHandle) -> Result<ContextHandle> {
        // SAFETY: device was produced by cuDeviceGet; the matching release is
        // issued by release_primary_context.
        let ctx = unsafe { result::primary_ctx::retain(device.0)? };
        info!(device = device.0, "Retained CUDA primary context");
        Ok(ContextHandle(ctx as usize))
    }

    fn release_primary_context(&mut self, device: DeviceHandle) -> Result<()> {
        // SAFETY: paired with a successful retain on the same device.
        unsafe { result::primary_ctx::release(device.0)? };
        Ok(())
    }

    fn copy_host_to_device_2d(
        &mut self,
        context: ContextHandle,
        copy: &HostToDeviceCopy<'_>,
    ) -> Result<()> {
        let need = copy.src_pitch * copy.rows.saturating_sub(1) + copy.width_bytes;
        if copy.rows > 0 && copy.src.len() < need {
            return Err(CodecError::BufferTooSmall {
                need,
                have: copy.src.len(),
            });
        }

        let params = sys::CUDA_MEMCPY2D {
            srcXInBytes: 0,
            srcY: 0,
            srcMemoryType: sys::CUmemorytype::CU_MEMORYTYPE_HOST,
            srcHost: copy.src.as_ptr() as *const c_void,
            srcDevice: 0,
            srcArray: std::ptr::null_mut(),
            srcPitch: copy.src_pitch,
            dstXInBytes: 0,
            dstY: 0,
            dstMemoryType: sys::CUmemorytype::CU_MEMORYTYPE_DEVICE,
            dstHost: std::ptr::null_mut(),
            dstDevice: copy.dst.0,
            dstArray: std::ptr::null_mut(),
            dstPitch: copy.dst_pitch,
            WidthInBytes: copy.width_bytes,
            Height: copy.rows,
        };

        // SAFETY: context is a retained primary context; the source slice is
        // valid for the extent checked above and the destination was handed
        // out by the encoder for this pitch.
        unsafe {
            result::ctx::set_current(context.0 as sys::CUcontext)?;
            sys::lib().cuMemcpy2D_v2(&params).result()?;
        }
        Ok(())
    }
}
