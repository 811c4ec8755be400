//! GPU execution context: one retained reference to a device's primary
//! context.
//!
//! The primary context is shared with every other GPU user in the process
//! and reference-counted by the driver.  [`ExecutionContext`] holds at most
//! one reference; [`create`](ExecutionContext::create) is idempotent and
//! [`destroy`](ExecutionContext::destroy) gives the reference back.  The
//! owner must call `destroy` before dropping the context, since only the
//! owner has access to the driver.

use tracing::{info, warn};

use crate::codec_traits::GpuDriver;
use crate::error::Result;
use crate::types::{ContextHandle, DeviceHandle, DeviceProperties};

#[derive(Debug, Default)]
pub struct ExecutionContext {
    gpu_index: u32,
    device: Option<DeviceHandle>,
    properties: Option<DeviceProperties>,
    /// Non-null iff the primary context is currently retained.
    handle: Option<ContextHandle>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retain the primary context of device `gpu_index`.
    ///
    /// Returns the existing handle if already created.  On failure at any
    /// step the context stays uninitialized, so the next call retries from
    /// scratch.
    pub fn create<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        gpu_index: u32,
    ) -> Result<ContextHandle> {
        if let Some(handle) = self.handle {
            return Ok(handle);
        }

        driver.init()?;
        let device = driver.device(gpu_index)?;
        let properties = driver.properties(device)?;
        let handle = driver.retain_primary_context(device)?;

        info!(
            gpu_index,
            device = device.0,
            name = %properties.name,
            compute_major = properties.compute_capability.0,
            compute_minor = properties.compute_capability.1,
            "GPU execution context retained"
        );

        self.gpu_index = gpu_index;
        self.device = Some(device);
        self.properties = Some(properties);
        self.handle = Some(handle);
        Ok(handle)
    }

    /// Release the retained context reference.  No-op if not created.
    pub fn destroy<D: GpuDriver + ?Sized>(&mut self, driver: &mut D) {
        let Some(_handle) = self.handle.take() else {
            return;
        };
        if let Some(device) = self.device {
            if let Err(err) = driver.release_primary_context(device) {
                warn!(error = %err, gpu_index = self.gpu_index, "Primary context release failed");
            } else {
                info!(gpu_index = self.gpu_index, "GPU execution context released");
            }
        }
    }

    #[inline]
    pub fn handle(&self) -> Option<ContextHandle> {
        self.handle
    }

    #[inline]
    pub fn is_created(&self) -> bool {
        self.handle.is_some()
    }

    #[inline]
    pub fn gpu_index(&self) -> u32 {
        self.gpu_index
    }

    #[inline]
    pub fn device(&self) -> Option<DeviceHandle> {
        self.device
    }

    /// Properties of the device, available once created at least once.
    #[inline]
    pub fn properties(&self) -> Option<&DeviceProperties> {
        self.properties.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::types::HostToDeviceCopy;

    #[derive(Default)]
    struct CountingDriver {
        inits: u32,
        retained: i32,
        fail_retain: bool,
    }

    impl GpuDriver for CountingDriver {
        fn init(&mut self) -> Result<()> {
            self.inits += 1;
            Ok(())
        }

        fn device(&mut self, index: u32) -> Result<DeviceHandle> {
            Ok(DeviceHandle(index as i32))
        }

        fn properties(&mut self, _device: DeviceHandle) -> Result<DeviceProperties> {
            Ok(DeviceProperties {
                name: "test".into(),
                ..DeviceProperties::default()
            })
        }

        fn retain_primary_context(&mut self, _device: DeviceHandle) -> Result<ContextHandle> {
            if self.fail_retain {
                return Err(CodecError::Driver("retain refused".into()));
            }
            self.retained += 1;
            Ok(ContextHandle(0xC0))
        }

        fn release_primary_context(&mut self, _device: DeviceHandle) -> Result<()> {
            self.retained -= 1;
            Ok(())
        }

        fn copy_host_to_device_2d(
            &mut self,
            _context: ContextHandle,
            _copy: &HostToDeviceCopy<'_>,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn create_is_idempotent() {
        let mut driver = CountingDriver::default();
        let mut ctx = ExecutionContext::new();
        let first = ctx.create(&mut driver, 1).expect("create");
        let second = ctx.create(&mut driver, 1).expect("create again");
        assert_eq!(first, second);
        assert_eq!(driver.inits, 1);
        assert_eq!(driver.retained, 1);
        assert_eq!(ctx.device(), Some(DeviceHandle(1)));
        assert_eq!(ctx.properties().map(|p| p.name.as_str()), Some("test"));
    }

    #[test]
    fn destroy_releases_once_and_is_safe_to_repeat() {
        let mut driver = CountingDriver::default();
        let mut ctx = ExecutionContext::new();
        ctx.destroy(&mut driver);
        assert_eq!(driver.retained, 0);

        ctx.create(&mut driver, 0).expect("create");
        ctx.destroy(&mut driver);
        ctx.destroy(&mut driver);
        assert_eq!(driver.retained, 0);
        assert!(!ctx.is_created());
        assert!(ctx.handle().is_none());
    }

    #[test]
    fn failed_create_leaves_context_uninitialized_for_retry() {
        let mut driver = CountingDriver {
            fail_retain: true,
            ..CountingDriver::default()
        };
        let mut ctx = ExecutionContext::new();
        ctx.create(&mut driver, 0).expect_err("retain fails");
        assert!(!ctx.is_created());

        driver.fail_retain = false;
        ctx.create(&mut driver, 0).expect("retry succeeds");
        assert!(ctx.is_created());
        assert_eq!(driver.inits, 2);
    }
}
