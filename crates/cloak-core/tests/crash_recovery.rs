//! Crash recovery tests for `RedbStorage`.
//!
//! These tests verify that personas, profiles and their links persist across
//! database close/reopen cycles, and that refused scopes never reach disk.

mod common;

use cloak_core::{
    ConnectionConfirmState, DeleteMode, Identifier, IdentityService, LinkedProfileDetails,
    NoAvatars, RedbStorage, Storage,
};
use common::{SeededEnv, assert_links_consistent, persona_keys, private_key, profile};
use tempfile::tempdir;

fn open(path: &std::path::Path) -> IdentityService<RedbStorage, SeededEnv, NoAvatars> {
    IdentityService::open(RedbStorage::open(path).unwrap(), SeededEnv::with_seed(1), NoAvatars)
        .unwrap()
}

#[tokio::test]
async fn links_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("identity.redb");
    let pending = LinkedProfileDetails { connection_confirm_state: ConnectionConfirmState::Pending };

    let persona = {
        let service = open(&path);
        let persona = service
            .create_profile_with_persona(&profile("bob"), pending, persona_keys(1, true))
            .await
            .unwrap();
        service.rename_persona(&persona, "work").await.unwrap();
        persona
    };

    let service = open(&path);
    let stored = service.query_persona(&persona).unwrap();
    assert_eq!(stored.nickname.as_deref(), Some("work"));
    assert_eq!(stored.linked_profiles[&profile("bob")], pending);
    assert_eq!(
        service.query_private_key(&Identifier::Profile(profile("bob"))).unwrap(),
        Some(private_key(1))
    );
    assert_eq!(service.personas().get().len(), 1);
    assert_links_consistent(service.db().storage());
}

#[tokio::test]
async fn refused_delete_is_not_persisted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("identity.redb");

    {
        let service = open(&path);
        let persona = service
            .create_profile_with_persona(
                &profile("bob"),
                LinkedProfileDetails::default(),
                persona_keys(1, true),
            )
            .await
            .unwrap();
        service.delete_persona(&persona, DeleteMode::SafeDelete).await.unwrap_err();
    }

    let service = open(&path);
    let linked = service.query_persona_by_profile(&profile("bob")).unwrap();
    assert!(linked.is_some());
    assert_links_consistent(service.db().storage());
}

#[tokio::test]
async fn delete_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("identity.redb");

    {
        let service = open(&path);
        let persona = service
            .create_profile_with_persona(
                &profile("bob"),
                LinkedProfileDetails::default(),
                persona_keys(1, true),
            )
            .await
            .unwrap();
        service.delete_persona(&persona, DeleteMode::ForceDelete).await.unwrap();
    }

    let storage = RedbStorage::open(&path).unwrap();
    assert!(storage.list_personas().unwrap().is_empty());
    let profiles = storage.list_profiles().unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].linked_persona, None);
}

#[tokio::test]
async fn many_reopen_cycles() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("identity.redb");

    for byte in 1..=5u8 {
        let service = open(&path);
        service
            .create_profile_with_persona(
                &profile(&format!("user{byte}")),
                LinkedProfileDetails::default(),
                persona_keys(byte, false),
            )
            .await
            .unwrap();
        assert_eq!(service.personas().get().len(), usize::from(byte));
    }

    let storage = RedbStorage::open(&path).unwrap();
    assert_eq!(storage.list_profiles().unwrap().len(), 5);
    assert_links_consistent(&storage);
}
