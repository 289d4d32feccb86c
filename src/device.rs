use candle_core::Device;
use once_cell::sync::Lazy;
use tracing::{info, warn};

/// Device that observation tensors are allocated on.
///
/// Set `TRADEGYM_DEVICE=cuda` to try the first CUDA device; anything else
/// stays on the CPU.
pub static DEVICE: Lazy<Device> = Lazy::new(|| {
    let requested = std::env::var("TRADEGYM_DEVICE").unwrap_or_default();
    if !requested.eq_ignore_ascii_case("cuda") {
        return Device::Cpu;
    }
    match Device::new_cuda(0) {
        Ok(device) => {
            info!("observations allocated on CUDA device 0");
            device
        }
        Err(err) => {
            warn!(error = %err, "failed to initialize CUDA device, falling back to CPU");
            Device::Cpu
        }
    }
});
