//! Cross-device data transfer.
//!
//! Upload, download and peer copy are distinct native primitives; routing
//! depends on the pair of endpoint locations, never on one side alone. A
//! zero-byte copy succeeds without invoking any primitive, and host→host is
//! out of scope here; the generic runtime's default copy handles it.

use thiserror::Error;

pub type DeviceId = u32;

/// Where a tensor's bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceLocation {
    Host,
    Device(DeviceId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("copy between {src:?} and {dst:?} is not supported")]
    UnsupportedPair {
        src: DeviceLocation,
        dst: DeviceLocation,
    },
    #[error("copy endpoints disagree on size: src {src} bytes, dst {dst} bytes")]
    SizeMismatch { src: u64, dst: u64 },
    #[error("layout has more than one non-contiguous dimension")]
    NonContiguousLayout,
    #[error("shape and strides do not describe a copyable layout")]
    InvalidLayout,
    #[error("native copy failed: {message}")]
    Native { message: String },
}

/// Declared capability predicate gating [`copy_tensor`].
pub fn can_copy(src: DeviceLocation, dst: DeviceLocation) -> bool {
    matches!(
        (src, dst),
        (DeviceLocation::Host, DeviceLocation::Device(_))
            | (DeviceLocation::Device(_), DeviceLocation::Host)
            | (DeviceLocation::Device(_), DeviceLocation::Device(_))
    )
}

/// Native byte-copy primitives supplied by a backend.
pub trait CopyPrimitives {
    type Buffer;

    fn upload(&self, src: &[u8], dst: &Self::Buffer) -> Result<(), TransferError>;

    fn download(&self, src: &Self::Buffer, dst: &mut [u8]) -> Result<(), TransferError>;

    fn peer_copy(
        &self,
        src: &Self::Buffer,
        src_device: DeviceId,
        dst: &Self::Buffer,
        dst_device: DeviceId,
    ) -> Result<(), TransferError>;
}

/// Copy source endpoint.
pub enum TransferSource<'a, B> {
    Host(&'a [u8]),
    Device {
        buffer: &'a B,
        device: DeviceId,
        len: u64,
    },
}

impl<B> TransferSource<'_, B> {
    fn location(&self) -> DeviceLocation {
        match self {
            TransferSource::Host(_) => DeviceLocation::Host,
            TransferSource::Device { device, .. } => DeviceLocation::Device(*device),
        }
    }

    fn len(&self) -> u64 {
        match self {
            TransferSource::Host(bytes) => bytes.len() as u64,
            TransferSource::Device { len, .. } => *len,
        }
    }
}

/// Copy destination endpoint.
pub enum TransferTarget<'a, B> {
    Host(&'a mut [u8]),
    Device {
        buffer: &'a B,
        device: DeviceId,
        len: u64,
    },
}

impl<B> TransferTarget<'_, B> {
    fn location(&self) -> DeviceLocation {
        match self {
            TransferTarget::Host(_) => DeviceLocation::Host,
            TransferTarget::Device { device, .. } => DeviceLocation::Device(*device),
        }
    }

    fn len(&self) -> u64 {
        match self {
            TransferTarget::Host(bytes) => bytes.len() as u64,
            TransferTarget::Device { len, .. } => *len,
        }
    }
}

/// Routes one copy onto the backend's native primitives.
pub fn copy_tensor<P: CopyPrimitives>(
    primitives: &P,
    src: TransferSource<'_, P::Buffer>,
    dst: TransferTarget<'_, P::Buffer>,
) -> Result<(), TransferError> {
    if src.len() != dst.len() {
        return Err(TransferError::SizeMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    if src.len() == 0 {
        return Ok(());
    }
    match (src, dst) {
        (TransferSource::Host(bytes), TransferTarget::Device { buffer, .. }) => {
            primitives.upload(bytes, buffer)
        }
        (TransferSource::Device { buffer, .. }, TransferTarget::Host(bytes)) => {
            primitives.download(buffer, bytes)
        }
        (
            TransferSource::Device {
                buffer: src_buffer,
                device: src_device,
                ..
            },
            TransferTarget::Device {
                buffer: dst_buffer,
                device: dst_device,
                ..
            },
        ) => primitives.peer_copy(src_buffer, src_device, dst_buffer, dst_device),
        (src, dst) => Err(TransferError::UnsupportedPair {
            src: src.location(),
            dst: dst.location(),
        }),
    }
}

/// Blocked-copy parameters for a strided layout.
///
/// A layout with at most one non-contiguous dimension copies as
/// `num_blocks` runs of `block_size` elements spaced `stride` elements
/// apart in the source; anything less regular is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyPlan {
    pub num_blocks: usize,
    pub block_size: usize,
    pub stride: usize,
}

impl CopyPlan {
    pub fn for_layout(shape: &[usize], strides: &[usize]) -> Result<Self, TransferError> {
        if shape.is_empty() || shape.len() != strides.len() {
            return Err(TransferError::InvalidLayout);
        }
        let total: usize = shape.iter().product();
        if total == 0 {
            return Ok(CopyPlan {
                num_blocks: 0,
                block_size: 0,
                stride: 0,
            });
        }

        // A dim is non-contiguous when its stride overshoots the span of
        // everything inner to it.
        let mut expected_stride = 1usize;
        let mut inner_elems = 1usize;
        let mut block: Option<(usize, usize)> = None;
        for i in (0..shape.len()).rev() {
            if shape[i] > 1 {
                if strides[i] > expected_stride {
                    if block.is_some() {
                        return Err(TransferError::NonContiguousLayout);
                    }
                    block = Some((inner_elems, strides[i]));
                }
                expected_stride = shape[i] * strides[i];
            }
            inner_elems *= shape[i];
        }

        Ok(match block {
            None => CopyPlan {
                num_blocks: 1,
                block_size: total,
                stride: total,
            },
            Some((block_size, stride)) => CopyPlan {
                num_blocks: total / block_size,
                block_size,
                stride,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct MockPrimitives {
        uploads: AtomicUsize,
        downloads: AtomicUsize,
        peer_copies: AtomicUsize,
    }

    impl CopyPrimitives for MockPrimitives {
        type Buffer = Vec<u8>;

        fn upload(&self, _src: &[u8], _dst: &Vec<u8>) -> Result<(), TransferError> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn download(&self, _src: &Vec<u8>, _dst: &mut [u8]) -> Result<(), TransferError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn peer_copy(
            &self,
            _src: &Vec<u8>,
            _src_device: DeviceId,
            _dst: &Vec<u8>,
            _dst_device: DeviceId,
        ) -> Result<(), TransferError> {
            self.peer_copies.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn can_copy_truth_table() {
        use DeviceLocation::*;
        assert!(can_copy(Host, Device(0)));
        assert!(can_copy(Device(0), Host));
        assert!(can_copy(Device(0), Device(0)));
        assert!(can_copy(Device(0), Device(1)));
        assert!(!can_copy(Host, Host));
    }

    #[test]
    fn routing_depends_on_the_location_pair() {
        let primitives = MockPrimitives::default();
        let device = vec![0u8; 4];
        let host = [1u8, 2, 3, 4];
        let mut host_out = [0u8; 4];

        copy_tensor(
            &primitives,
            TransferSource::Host(&host),
            TransferTarget::Device {
                buffer: &device,
                device: 0,
                len: 4,
            },
        )
        .unwrap();
        copy_tensor(
            &primitives,
            TransferSource::Device {
                buffer: &device,
                device: 0,
                len: 4,
            },
            TransferTarget::Host(&mut host_out),
        )
        .unwrap();
        copy_tensor(
            &primitives,
            TransferSource::Device {
                buffer: &device,
                device: 0,
                len: 4,
            },
            TransferTarget::Device {
                buffer: &device,
                device: 1,
                len: 4,
            },
        )
        .unwrap();

        assert_eq!(primitives.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(primitives.downloads.load(Ordering::SeqCst), 1);
        assert_eq!(primitives.peer_copies.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_byte_copies_bypass_the_native_primitives() {
        let primitives = MockPrimitives::default();
        let device = Vec::new();
        let mut host: [u8; 0] = [];

        copy_tensor(
            &primitives,
            TransferSource::Host(&[]),
            TransferTarget::Device {
                buffer: &device,
                device: 0,
                len: 0,
            },
        )
        .unwrap();
        copy_tensor(
            &primitives,
            TransferSource::Host(&[]),
            TransferTarget::Host(&mut host),
        )
        .unwrap();

        assert_eq!(primitives.uploads.load(Ordering::SeqCst), 0);
        assert_eq!(primitives.downloads.load(Ordering::SeqCst), 0);
        assert_eq!(primitives.peer_copies.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn host_to_host_is_out_of_scope() {
        let primitives = MockPrimitives::default();
        let src = [1u8];
        let mut dst = [0u8];
        let err = copy_tensor(
            &primitives,
            TransferSource::Host(&src),
            TransferTarget::Host(&mut dst),
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransferError::UnsupportedPair {
                src: DeviceLocation::Host,
                dst: DeviceLocation::Host,
            }
        );
    }

    #[test]
    fn mismatched_sizes_fail_before_any_primitive_runs() {
        let primitives = MockPrimitives::default();
        let device = vec![0u8; 8];
        let err = copy_tensor(
            &primitives,
            TransferSource::Host(&[1, 2, 3]),
            TransferTarget::Device {
                buffer: &device,
                device: 0,
                len: 8,
            },
        )
        .unwrap_err();
        assert_eq!(err, TransferError::SizeMismatch { src: 3, dst: 8 });
        assert_eq!(primitives.uploads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn copy_plan_innermost_non_contiguous() {
        let plan = CopyPlan::for_layout(&[1, 1, 8, 8], &[128, 128, 16, 2]).unwrap();
        assert_eq!(
            plan,
            CopyPlan {
                num_blocks: 64,
                block_size: 1,
                stride: 2,
            }
        );
    }

    #[test]
    fn copy_plan_second_innermost_non_contiguous() {
        let plan = CopyPlan::for_layout(&[1, 1, 8, 8], &[128, 128, 16, 1]).unwrap();
        assert_eq!(
            plan,
            CopyPlan {
                num_blocks: 8,
                block_size: 8,
                stride: 16,
            }
        );
    }

    #[test]
    fn copy_plan_outer_non_contiguous() {
        let plan = CopyPlan::for_layout(&[1, 2, 4, 4], &[48, 24, 4, 1]).unwrap();
        assert_eq!(
            plan,
            CopyPlan {
                num_blocks: 2,
                block_size: 16,
                stride: 24,
            }
        );
    }

    #[test]
    fn copy_plan_rejects_two_non_contiguous_dims() {
        let err = CopyPlan::for_layout(&[1, 2, 4, 4], &[96, 48, 8, 1]).unwrap_err();
        assert_eq!(err, TransferError::NonContiguousLayout);
    }

    #[test]
    fn copy_plan_contiguous_is_a_single_block() {
        let plan = CopyPlan::for_layout(&[2, 3, 4], &[12, 4, 1]).unwrap();
        assert_eq!(
            plan,
            CopyPlan {
                num_blocks: 1,
                block_size: 24,
                stride: 24,
            }
        );
    }
}
