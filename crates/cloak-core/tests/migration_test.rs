//! Legacy migrations run end to end through the record store.

mod common;

use cloak_core::{
    Identifier, IdentityService, MemoryStorage, NewPersona, NoAvatars, PersonaIdentifier,
    match_all,
    migrate::{LegacyPerson, PeopleToPersona, default_steps, run_migrations},
};
use cloak_crypto::{CryptoKey, generate_key_pair_from_mnemonic};
use common::{SeededEnv, assert_links_consistent, private_key, profile};

type Service = IdentityService<MemoryStorage, SeededEnv, NoAvatars>;

fn service() -> Service {
    IdentityService::open(MemoryStorage::new(), SeededEnv::with_seed(11), NoAvatars).unwrap()
}

fn legacy_person(user_id: &str, byte: u8) -> LegacyPerson {
    let key = private_key(byte);
    LegacyPerson {
        identifier: profile(user_id),
        nickname: Some(user_id.to_string()),
        public_key: CryptoKey::EcdhPublic(key.public_key()).to_jwk(),
        private_key: Some(CryptoKey::EcdhPrivate(key).to_jwk()),
        local_key: None,
    }
}

/// Persona whose stored private key lost its `d` member
async fn seed_broken_qr_persona(service: &Service, byte: u8) -> PersonaIdentifier {
    let public_key = CryptoKey::EcdhPublic(private_key(byte).public_key()).to_jwk();
    let mut persona = NewPersona::from_public_key(public_key.clone()).unwrap();
    persona.private_key = Some(public_key);
    let id = persona.identifier().clone();
    service.db().consistent_write_access(|txn| txn.create_persona(persona)).await.unwrap();
    id
}

/// Persona created from a mnemonic before local keys existed
async fn seed_persona_without_local_key(service: &Service) -> PersonaIdentifier {
    let generated = generate_key_pair_from_mnemonic("", [3u8; 16]).unwrap();
    let mut persona = NewPersona::from_public_key(
        CryptoKey::EcdhPublic(generated.key_pair.public_key).to_jwk(),
    )
    .unwrap();
    persona.private_key = Some(CryptoKey::EcdhPrivate(generated.key_pair.private_key).to_jwk());
    persona.mnemonic = Some(generated.mnemonic_record);
    let id = persona.identifier().clone();
    service.db().consistent_write_access(|txn| txn.create_persona(persona)).await.unwrap();
    id
}

#[tokio::test]
async fn default_steps_migrate_everything_once() {
    let service = service();
    let broken = seed_broken_qr_persona(&service, 8).await;
    let without_local_key = seed_persona_without_local_key(&service).await;
    let legacy = PeopleToPersona::new(vec![legacy_person("bob", 1), legacy_person("carol", 2)]);

    let report = run_migrations(service.db(), &default_steps::<MemoryStorage>(&legacy)).await.unwrap();

    let names: Vec<_> = report.steps.iter().map(|step| step.name).collect();
    assert_eq!(names, ["people-to-persona", "fix-qr-private-key", "backfill-local-key"]);
    assert_eq!(report.total_changed(), 4);

    let bob = service.query_persona_by_profile(&profile("bob")).unwrap().unwrap();
    assert!(bob.has_private_key);
    assert!(!service.query_persona(&broken).unwrap().has_private_key);
    assert!(
        service.query_local_key(&Identifier::Persona(without_local_key)).unwrap().is_some()
    );
    assert_links_consistent(service.db().storage());
}

#[tokio::test]
async fn second_run_changes_nothing() {
    let service = service();
    seed_broken_qr_persona(&service, 8).await;
    let legacy = PeopleToPersona::new(vec![legacy_person("bob", 1)]);

    run_migrations(service.db(), &default_steps::<MemoryStorage>(&legacy)).await.unwrap();
    let personas = service.db().query_personas(match_all).unwrap();
    let commits = service.db().storage().commit_count().unwrap();

    let report = run_migrations(service.db(), &default_steps::<MemoryStorage>(&legacy)).await.unwrap();

    assert_eq!(report.total_changed(), 0);
    assert_eq!(service.db().query_personas(match_all).unwrap(), personas);
    assert_eq!(service.db().storage().commit_count().unwrap(), commits);
}

#[tokio::test]
async fn empty_store_runs_clean() {
    let service = service();
    let legacy = PeopleToPersona::default();

    let report = run_migrations(service.db(), &default_steps::<MemoryStorage>(&legacy)).await.unwrap();

    assert_eq!(report.steps.len(), 3);
    assert_eq!(report.total_changed(), 0);
    assert_eq!(service.db().storage().commit_count().unwrap(), 0);
}
