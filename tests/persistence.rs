//! Topology written through the gateway survives a restart, arrives in
//! submission order, and degrades gracefully when the backend fails.

#[path = "support/recording_world.rs"]
mod recording_world;

use std::path::Path;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use mockall::mock;
use recording_world::RecordingWorld;
use wireless::storage::{ChannelRecord, EndpointRecord, StorageBackend, StorageError};
use wireless::{
    Channel, ChannelKey, Config, Direction, Location, Registration, RoleKind, StorageKind,
    Wireless,
};

mock! {
    pub Backend {}
    impl StorageBackend for Backend {
        fn init(&mut self) -> Result<(), StorageError>;
        fn list_channels(&mut self) -> Result<Vec<Channel>, StorageError>;
        fn channel(&mut self, key: &ChannelKey) -> Result<Option<Channel>, StorageError>;
        fn insert_channel(&mut self, record: &ChannelRecord) -> Result<(), StorageError>;
        fn update_channel(
            &mut self,
            key: &ChannelKey,
            record: &ChannelRecord,
        ) -> Result<(), StorageError>;
        fn delete_channel(&mut self, key: &ChannelKey) -> Result<(), StorageError>;
        fn insert_endpoint(
            &mut self,
            key: &ChannelKey,
            record: &EndpointRecord,
        ) -> Result<(), StorageError>;
        fn delete_endpoint(
            &mut self,
            key: &ChannelKey,
            location: &Location,
        ) -> Result<(), StorageError>;
        fn close(&mut self) -> Result<(), StorageError>;
    }
}

fn host() -> Arc<RecordingWorld> {
    Arc::new(RecordingWorld::with_worlds(&["world"]))
}

fn at(x: i32) -> Location {
    Location::new("world", x, 0, 0)
}

fn open(storage: StorageKind, dir: &Path) -> Result<Wireless> {
    let config = Config {
        storage,
        data_dir: dir.to_path_buf(),
        debug: false,
    };
    Ok(Wireless::from_config(&config, host())?)
}

fn populate(wireless: &Wireless) -> Result<()> {
    wireless.register_endpoint(
        "Red",
        Registration::new(at(0), "alice", RoleKind::Transmitter).mounted(true, Direction::East),
    )?;
    wireless.register_endpoint(
        "red",
        Registration::new(at(1), "alice", RoleKind::ReceiverDelayer).with_delay(80),
    )?;
    wireless.register_endpoint(
        "blue",
        Registration::new(at(2), "bob", RoleKind::ReceiverClock).with_delay(120),
    )?;
    wireless.add_owner("red", "carol")?;
    ensure!(wireless.unregister_endpoint("blue", &at(2)));
    Ok(())
}

fn survives_restart(storage: StorageKind) -> Result<()> {
    let dir = tempfile::tempdir().context("creating temp dir")?;
    let before = {
        let wireless = open(storage, dir.path())?;
        populate(&wireless)?;
        wireless.close()?;
        wireless.channels()
    };

    let reopened = open(storage, dir.path())?;
    let after = reopened.channels();
    ensure!(after == before, "reloaded {after:?}, expected {before:?}");

    let red = reopened.registry().channel("RED").context("red exists")?;
    ensure!(red.name == "Red", "name keeps its first spelling");
    ensure!(red.owners == ["alice", "carol"]);
    let blue = reopened.registry().channel("blue").context("blue exists")?;
    ensure!(blue.endpoints.is_empty(), "emptied channels are kept");
    ensure!(reopened.find_channel_at(&at(1)).is_some());
    Ok(())
}

#[test]
fn json_store_survives_restart() -> Result<()> {
    survives_restart(StorageKind::Json)
}

#[cfg(feature = "sqlite")]
#[test]
fn sqlite_store_survives_restart() -> Result<()> {
    survives_restart(StorageKind::Sqlite)
}

#[test]
fn sequential_writes_apply_in_order() -> Result<()> {
    let dir = tempfile::tempdir().context("creating temp dir")?;
    let wireless = open(StorageKind::Json, dir.path())?;
    wireless.register_endpoint("red", Registration::new(at(0), "alice", RoleKind::Transmitter))?;
    for round in 0..25 {
        let owner = format!("player-{round}");
        wireless.add_owner("red", &owner)?;
        if round % 3 == 0 {
            wireless.remove_owner("red", &owner)?;
        }
        wireless.register_endpoint(
            "red",
            Registration::new(at(round + 1), "alice", RoleKind::Receiver),
        )?;
        if round % 2 == 0 {
            ensure!(wireless.unregister_endpoint("red", &at(round + 1)));
        }
    }
    wireless.gateway().flush()?;

    let staged = wireless.registry().channel("red").context("red is staged")?;
    let committed = wireless
        .gateway()
        .cache()
        .channel(&ChannelKey::new("red"))
        .cloned()
        .context("red is cached")?;
    ensure!(committed == staged, "cache diverged from registry");
    ensure!(wireless.stats().failed() == 0);
    wireless.close()?;

    let reopened = open(StorageKind::Json, dir.path())?;
    ensure!(reopened.registry().channel("red") == Some(staged));
    Ok(())
}

#[test]
fn failed_writes_are_counted_and_dropped() -> Result<()> {
    let mut backend = MockBackend::new();
    backend.expect_init().times(1).returning(|| Ok(()));
    backend
        .expect_list_channels()
        .times(1)
        .returning(|| Ok(Vec::new()));
    backend.expect_insert_channel().times(1).returning(|_| Ok(()));
    backend
        .expect_insert_endpoint()
        .times(2)
        .returning(|_, _| Err(StorageError::InvalidRecord("disk full".to_owned())));
    backend
        .expect_delete_channel()
        .times(1)
        .returning(|_| Ok(()));
    backend.expect_close().times(1).returning(|| Ok(()));

    let wireless = Wireless::new(Box::new(backend), host())?;
    wireless.register_endpoint("red", Registration::new(at(0), "alice", RoleKind::Transmitter))?;
    wireless.register_endpoint("red", Registration::new(at(1), "alice", RoleKind::Receiver))?;
    wireless.gateway().flush()?;

    ensure!(wireless.stats().failed() == 2, "both endpoint writes fail");
    ensure!(wireless.stats().applied() == 0);
    ensure!(
        wireless.find_channel_at(&at(1)).is_none(),
        "refused writes never reach the committed cache"
    );
    ensure!(wireless.gateway().cache().is_empty(), "the new channel was rolled back");
    let staged = wireless.registry().channel("red").context("red is staged")?;
    ensure!(staged.endpoints.len() == 2, "the session keeps the requested topology");
    wireless.close()?;
    Ok(())
}
