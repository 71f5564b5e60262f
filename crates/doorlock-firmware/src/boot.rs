//! Power-up sequence.

use doorlock_cardman::DatabaseLayout;
use doorlock_core::{ErrorKind, FirmwareConfig, constants::FIRMWARE_VERSION};
use doorlock_hardware::{Board, Peripherals, RfidScanner, Signal};
use tracing::{error, info};

use crate::device::Device;
use crate::error::Result;
use crate::machine::MainStateMachine;

/// Bring the lock up and return the main loop, ready to run.
///
/// An unreadable or foreign card database is formatted rather than
/// refused; the lock must come up with no keys, which leaves it open. A
/// reader that fails to initialize is announced with the error tone and
/// the lock starts anyway.
///
/// # Errors
///
/// Invalid configuration, a store too small for `layout`, or a storage
/// failure while formatting.
pub async fn boot<B: Board>(
    peripherals: Peripherals<B>,
    layout: DatabaseLayout,
    config: FirmwareConfig,
) -> Result<MainStateMachine<B>> {
    config.validate()?;
    let mut device = Device::new(peripherals, layout, config)?;

    match device.cards.initialize() {
        Ok(()) => {}
        Err(e) if matches!(e.kind(), ErrorKind::BadData | ErrorKind::NotSupported) => {
            error!(error = %e, "card database unusable, formatting");
            device.cards.format()?;
        }
        Err(e) => return Err(e.into()),
    }

    info!(
        version = FIRMWARE_VERSION,
        function = %device.software_function(),
        keys = device.cards.key_count(),
        soft_cards = device.cards.soft_card_count(),
        open_delay = device.cards.open_delay(),
        "lock starting"
    );

    match device.rfid.initialize() {
        Ok(()) => device.play(Signal::Hello).await,
        Err(e) => {
            error!(error = %e, "RFID initialization failed");
            device.play(Signal::Error).await;
        }
    }

    tokio::time::sleep(device.config.startup_wait()).await;
    Ok(MainStateMachine::new(device))
}
