//! Concurrent write scopes against one service
//!
//! Write scopes are serialized by the write gate, so whatever order the
//! runtime picks, the final state must equal one serial ordering of the
//! same operations.

mod common;

use std::sync::{Arc, Mutex};

use cloak_core::{
    DeleteMode, IdentityError, IdentityService, LinkedProfileDetails, MemoryStorage, NoAvatars,
    PersonaIdentifier, match_all,
};
use common::{SeededEnv, assert_links_consistent, persona_keys, profile};

type Service = IdentityService<MemoryStorage, SeededEnv, NoAvatars>;

fn service(seed: u64) -> Arc<Service> {
    Arc::new(IdentityService::open(MemoryStorage::new(), SeededEnv::with_seed(seed), NoAvatars).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delete_and_rename_serialize() {
    for seed in 0..32 {
        let service = service(seed);
        let persona = service
            .create_profile_with_persona(
                &profile("bob"),
                LinkedProfileDetails::default(),
                persona_keys(1, true),
            )
            .await
            .unwrap();

        let deleter = {
            let service = Arc::clone(&service);
            let persona = persona.clone();
            tokio::spawn(async move { service.delete_persona(&persona, DeleteMode::ForceDelete).await })
        };
        let renamer = {
            let service = Arc::clone(&service);
            let persona = persona.clone();
            tokio::spawn(async move { service.rename_persona(&persona, "renamed").await })
        };

        deleter.await.unwrap().unwrap();
        match renamer.await.unwrap() {
            // Rename ran first, then the delete removed the renamed persona
            Ok(renamed) => assert_eq!(renamed.nickname.as_deref(), Some("renamed")),
            // Delete ran first
            Err(err) => assert_eq!(err, IdentityError::PersonaNotFound(persona.clone())),
        }

        assert!(service.db().query_persona(&persona).unwrap().is_none());
        assert!(service.query_persona_by_profile(&profile("bob")).unwrap().is_none());
        assert_links_consistent(service.db().storage());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_attaches_leave_one_link() {
    let service = service(3);
    let personas: Vec<PersonaIdentifier> = {
        let mut ids = Vec::new();
        for byte in 1..=4 {
            ids.push(service.create_persona_by_json_web_key(persona_keys(byte, true)).await.unwrap());
        }
        ids
    };

    let tasks: Vec<_> = personas
        .iter()
        .cloned()
        .map(|persona| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .attach_profile(&profile("bob"), &persona, LinkedProfileDetails::default())
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let holders = service
        .db()
        .query_personas(|p| p.linked_profiles.contains_key(&profile("bob")))
        .unwrap();
    assert_eq!(holders.len(), 1);
    let stored = service.db().query_profile(&profile("bob")).unwrap().unwrap();
    assert_eq!(stored.linked_persona.as_ref(), Some(&holders[0].identifier));
    assert_links_consistent(service.db().storage());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_all_land() {
    let service = service(9);

    let tasks: Vec<_> = (1..=16u8)
        .map(|byte| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .create_profile_with_persona(
                        &profile(&format!("user{byte}")),
                        LinkedProfileDetails::default(),
                        persona_keys(byte, byte % 2 == 0),
                    )
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(service.db().query_personas(match_all).unwrap().len(), 16);
    assert_eq!(service.personas().get().len(), 16);
    assert_links_consistent(service.db().storage());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn published_persona_list_only_grows_under_concurrent_creates() {
    for seed in 0..20 {
        let service = service(seed);
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&published);
        let _subscription =
            service.personas().subscribe(move |list| sink.lock().unwrap().push(list.len()));

        let tasks: Vec<_> = (1..=16u8)
            .map(|byte| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .create_profile_with_persona(
                            &profile(&format!("user{byte}")),
                            LinkedProfileDetails::default(),
                            persona_keys(byte, true),
                        )
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Each create commits one more persona, so every published list is one longer
        let published = published.lock().unwrap().clone();
        assert_eq!(published, (1..=16).collect::<Vec<usize>>(), "seed {seed}");
        assert_eq!(service.personas().get().len(), 16);
        assert_eq!(service.db().query_personas(match_all).unwrap().len(), 16);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_creates_have_one_winner() {
    let service = service(5);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.create_persona_by_json_web_key(persona_keys(7, true)).await })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(err) => assert!(matches!(err, IdentityError::PersonaAlreadyExists(_))),
        }
    }
    assert_eq!(created, 1);
}
