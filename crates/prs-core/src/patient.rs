//! Patient service.
//!
//! [`PatientService`] owns the database handle and the photo store and implements
//! the five patient operations. Validation and not-found decisions are made before
//! anything is written; every write then happens inside a single transaction that
//! is rolled back (by drop) on any early return.

use crate::constants::PAGE_SIZE;
use crate::db::Database;
use crate::error::{PatientError, PatientResult, DELETING, UPDATING};
use crate::models::{Patient, PatientInput, PatientPage};
use crate::repositories::{addresses, patients};
use crate::validation::{
    validate_create, validate_update, TakenIdentifiers, ValidPatient, ValidationErrors,
};
use prs_files::{PhotoStore, PhotoUpload, StoredPhoto};
use prs_types::NonEmptyText;
use std::sync::Arc;

/// Patient operations over an injected database and photo store.
#[derive(Clone, Debug)]
pub struct PatientService {
    db: Database,
    photos: Arc<dyn PhotoStore>,
}

impl PatientService {
    pub fn new(db: Database, photos: Arc<dyn PhotoStore>) -> Self {
        Self { db, photos }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// One page of patients ordered by name.
    ///
    /// `term` is matched case-insensitively as a substring of the full name, CPF
    /// or CNS. A blank term lists everyone. Pages start at 1; `0` is read as 1.
    pub async fn search(&self, term: Option<&str>, page: u32) -> PatientResult<PatientPage> {
        let term = term.map(str::trim).filter(|t| !t.is_empty());
        let page = page.max(1);
        let offset = u64::from(page - 1) * u64::from(PAGE_SIZE);

        let mut conn = self.db.pool().acquire().await?;
        let total = patients::count(&mut conn, term).await?;
        let items = patients::search(&mut conn, term, PAGE_SIZE, offset).await?;

        Ok(PatientPage::new(items, page, PAGE_SIZE, total))
    }

    /// Register a new patient with a freshly inserted address.
    ///
    /// # Errors
    ///
    /// - `Validation` if any field rule fails or the CPF/CNS is already registered.
    /// - `Storage` if the photo could not be written; nothing is persisted.
    /// - `Database` for any other store failure.
    pub async fn create(&self, input: PatientInput) -> PatientResult<Patient> {
        let taken = self.taken_identifiers(&input, None).await?;
        let valid = validate_create(input, taken).map_err(PatientError::Validation)?;

        let mut stored = None;
        let result = self.insert_patient(&valid, &mut stored).await;
        let patient = match result {
            Ok(patient) => patient,
            Err(e) => {
                self.discard_photo(stored.as_ref());
                return Err(unique_conflict(e));
            }
        };

        tracing::info!("created patient {}", patient.id);
        Ok(patient)
    }

    async fn insert_patient(
        &self,
        valid: &ValidPatient,
        stored: &mut Option<StoredPhoto>,
    ) -> PatientResult<Patient> {
        let mut tx = self.db.begin().await?;

        let address = addresses::insert(&mut tx, &valid.address).await?;
        *stored = self.store_photo(valid.photo.as_ref())?;
        let photo_url = stored.as_ref().map(|s| s.url.as_str());
        let id = patients::insert(&mut tx, valid, address.id, photo_url).await?;
        let patient = patients::find(&mut tx, id)
            .await?
            .ok_or(PatientError::NotFound(id))?;

        tx.commit().await?;
        Ok(patient)
    }

    /// Whether a patient with this id exists.
    pub async fn exists(&self, id: i64) -> PatientResult<bool> {
        let mut conn = self.db.pool().acquire().await?;
        patients::exists(&mut conn, id).await
    }

    /// Fetch a patient with its address.
    pub async fn show(&self, id: i64) -> PatientResult<Patient> {
        let mut conn = self.db.pool().acquire().await?;
        patients::find(&mut conn, id)
            .await?
            .ok_or(PatientError::NotFound(id))
    }

    /// Replace a patient's fields.
    ///
    /// The address is resolved by postal code: the first existing address with the
    /// same postal code is linked as-is, otherwise a new one is inserted. The photo
    /// URL is only replaced when a new photo is supplied.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no patient has this id, checked before anything else.
    /// - `Validation` for rule failures or a CPF/CNS held by another patient.
    /// - `Persistence` if the write failed; everything is rolled back.
    pub async fn update(&self, id: i64, input: PatientInput) -> PatientResult<()> {
        if !self.exists(id).await? {
            return Err(PatientError::NotFound(id));
        }

        let taken = self.taken_identifiers(&input, Some(id)).await?;
        let valid = validate_update(input, taken).map_err(PatientError::Validation)?;

        let mut stored = None;
        if let Err(e) = self.update_patient(id, &valid, &mut stored).await {
            self.discard_photo(stored.as_ref());
            return Err(match unique_conflict(e) {
                e @ (PatientError::Validation(_) | PatientError::NotFound(_)) => e,
                e => PatientError::persistence(UPDATING, e),
            });
        }

        tracing::info!("updated patient {}", id);
        Ok(())
    }

    async fn update_patient(
        &self,
        id: i64,
        valid: &ValidPatient,
        stored: &mut Option<StoredPhoto>,
    ) -> PatientResult<()> {
        let mut tx = self.db.begin().await?;

        let address = addresses::find_or_create_by_postal_code(&mut tx, &valid.address).await?;
        *stored = self.store_photo(valid.photo.as_ref())?;
        let photo_url = stored.as_ref().map(|s| s.url.as_str());
        let changed = patients::update(&mut tx, id, valid, address.id, photo_url).await?;
        if changed == 0 {
            return Err(PatientError::NotFound(id));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete a patient. The address row and any stored photo are kept.
    pub async fn delete(&self, id: i64) -> PatientResult<()> {
        if !self.exists(id).await? {
            return Err(PatientError::NotFound(id));
        }

        let result: PatientResult<u64> = async {
            let mut tx = self.db.begin().await?;
            let deleted = patients::delete(&mut tx, id).await?;
            tx.commit().await?;
            Ok(deleted)
        }
        .await;

        match result {
            Ok(0) => Err(PatientError::NotFound(id)),
            Ok(_) => {
                tracing::info!("deleted patient {}", id);
                Ok(())
            }
            Err(e) => Err(PatientError::persistence(DELETING, e)),
        }
    }

    /// Look up whether the submitted CPF/CNS belong to a patient other than `except_id`.
    /// Blank values are left to the required rule.
    async fn taken_identifiers(
        &self,
        input: &PatientInput,
        except_id: Option<i64>,
    ) -> PatientResult<TakenIdentifiers> {
        let cpf = NonEmptyText::from_optional(input.national_id_cpf.as_deref());
        let cns = NonEmptyText::from_optional(input.national_health_card_cns.as_deref());

        let mut conn = self.db.pool().acquire().await?;
        let mut taken = TakenIdentifiers::default();
        if let Some(cpf) = cpf {
            taken.cpf = patients::is_cpf_taken(&mut conn, cpf.as_str(), except_id).await?;
        }
        if let Some(cns) = cns {
            taken.cns = patients::is_cns_taken(&mut conn, cns.as_str(), except_id).await?;
        }
        Ok(taken)
    }

    fn store_photo(&self, upload: Option<&PhotoUpload>) -> PatientResult<Option<StoredPhoto>> {
        let Some(upload) = upload else {
            return Ok(None);
        };
        let stored = self.photos.store(upload)?;
        tracing::debug!("stored photo {}", stored.relative_path);
        Ok(Some(stored))
    }

    fn discard_photo(&self, stored: Option<&StoredPhoto>) {
        let Some(stored) = stored else {
            return;
        };
        if let Err(e) = self.photos.discard(stored) {
            tracing::warn!("failed to remove photo {}: {}", stored.relative_path, e);
        }
    }
}

/// Report a CPF/CNS unique-constraint violation the same way the up-front check does.
fn unique_conflict(err: PatientError) -> PatientError {
    let Some(column) = err.unique_violation_column() else {
        return err;
    };
    let mut errors = ValidationErrors::new();
    errors.add(
        column,
        format!("The {} has already been taken.", column.replace('_', " ")),
    );
    PatientError::Validation(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AddressInput;
    use prs_files::{FilesError, FilesystemPhotoStore};
    use tempfile::TempDir;

    const PNG_BYTES: [u8; 16] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52,
    ];

    /// Photo store that refuses every write.
    #[derive(Debug)]
    struct BrokenPhotoStore;

    impl PhotoStore for BrokenPhotoStore {
        fn store(&self, _upload: &PhotoUpload) -> Result<StoredPhoto, FilesError> {
            Err(FilesError::Io(std::io::Error::other("disk full")))
        }

        fn discard(&self, _stored: &StoredPhoto) -> Result<(), FilesError> {
            Ok(())
        }
    }

    async fn setup(temp: &TempDir) -> (PatientService, Arc<FilesystemPhotoStore>) {
        let photos = Arc::new(
            FilesystemPhotoStore::new(&temp.path().join("photos"), "/storage/photos")
                .expect("photo store should open"),
        );
        (setup_with(temp, photos.clone()).await, photos)
    }

    async fn setup_with(temp: &TempDir, photos: Arc<dyn PhotoStore>) -> PatientService {
        let url = format!("sqlite://{}", temp.path().join("patients.db").display());
        let db = Database::connect(&url).await.expect("connect should succeed");
        db.migrate().await.expect("migrate should succeed");
        PatientService::new(db, photos)
    }

    fn some(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    fn maria() -> PatientInput {
        PatientInput {
            full_name: some("Maria Silva"),
            mother_name: some("Ana Silva"),
            birth_date: some("1990-01-01"),
            national_id_cpf: some("12345678901"),
            national_health_card_cns: some("123456789012345"),
            address: AddressInput {
                postal_code: some("01001000"),
                street: some("Praça da Sé"),
                number: some("1"),
                complement: None,
                neighborhood: some("Sé"),
                city: some("São Paulo"),
                state: some("SP"),
            },
            photo: None,
        }
    }

    fn patient(name: &str, cpf: &str, cns: &str) -> PatientInput {
        PatientInput {
            full_name: some(name),
            national_id_cpf: some(cpf),
            national_health_card_cns: some(cns),
            ..maria()
        }
    }

    async fn address_count(service: &PatientService) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM addresses")
            .fetch_one(service.database().pool())
            .await
            .unwrap()
    }

    async fn patient_count(service: &PatientService) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM patients")
            .fetch_one(service.database().pool())
            .await
            .unwrap()
    }

    async fn reject_patient_inserts(service: &PatientService) {
        sqlx::query(
            "CREATE TRIGGER reject_patients BEFORE INSERT ON patients \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(service.database().pool())
        .await
        .unwrap();
    }

    fn photo_file_count(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .map(|entry| entry.unwrap().path())
                    .map(|path| if path.is_dir() { photo_file_count(&path) } else { 1 })
                    .sum()
            })
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_create_then_show() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, _) = setup(&temp).await;

        let created = service.create(maria()).await.expect("create should succeed");
        assert_eq!(created.full_name, "Maria Silva");
        assert_eq!(created.address.postal_code, "01001000");
        assert_eq!(created.address_id, created.address.id);
        assert!(created.photo_url.is_none());

        let shown = service.show(created.id).await.expect("show should succeed");
        assert_eq!(shown, created);
    }

    #[tokio::test]
    async fn test_create_always_inserts_new_address() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, _) = setup(&temp).await;

        let first = service.create(maria()).await.unwrap();
        let second = service
            .create(patient("João Souza", "98765432100", "987654321098765"))
            .await
            .unwrap();

        assert_ne!(first.address_id, second.address_id);
        assert_eq!(address_count(&service).await, 2);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_cpf_without_side_effects() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, _) = setup(&temp).await;
        service.create(maria()).await.unwrap();

        let err = service
            .create(patient("Other", "12345678901", "999999999999999"))
            .await
            .expect_err("duplicate cpf should fail");

        let PatientError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(
            errors.messages("national_id_cpf"),
            ["The national id cpf has already been taken."]
        );
        assert_eq!(patient_count(&service).await, 1);
        assert_eq!(address_count(&service).await, 1);
    }

    #[tokio::test]
    async fn test_create_stores_photo() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, photos) = setup(&temp).await;

        let mut input = maria();
        input.photo = Some(PhotoUpload::new(Some("me.png".into()), PNG_BYTES.to_vec()));
        let created = service.create(input).await.unwrap();

        let url = created.photo_url.expect("photo url should be set");
        let relative = url
            .strip_prefix("/storage/photos/")
            .expect("url should use the public base");
        assert_eq!(photos.read(relative).unwrap(), PNG_BYTES);
    }

    #[tokio::test]
    async fn test_create_photo_failure_leaves_nothing_behind() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let service = setup_with(&temp, Arc::new(BrokenPhotoStore)).await;

        let mut input = maria();
        input.photo = Some(PhotoUpload::new(None, PNG_BYTES.to_vec()));
        let err = service.create(input).await.expect_err("store should fail");

        assert!(matches!(err, PatientError::Storage(_)));
        assert_eq!(patient_count(&service).await, 0);
        assert_eq!(address_count(&service).await, 0);
    }

    #[tokio::test]
    async fn test_create_database_failure_removes_new_photo() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, _) = setup(&temp).await;
        reject_patient_inserts(&service).await;

        let mut input = maria();
        input.photo = Some(PhotoUpload::new(None, PNG_BYTES.to_vec()));
        let err = service.create(input).await.expect_err("insert should fail");

        assert!(matches!(err, PatientError::Database(_)));
        assert_eq!(address_count(&service).await, 0);
        assert_eq!(photo_file_count(&temp.path().join("photos")), 0);
    }

    #[tokio::test]
    async fn test_create_failure_keeps_same_photo_of_saved_patient() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, photos) = setup(&temp).await;
        let mut input = maria();
        input.photo = Some(PhotoUpload::new(None, PNG_BYTES.to_vec()));
        let saved = service.create(input).await.unwrap();

        reject_patient_inserts(&service).await;
        let mut input = patient("João Souza", "98765432100", "987654321098765");
        input.photo = Some(PhotoUpload::new(None, PNG_BYTES.to_vec()));
        service.create(input).await.expect_err("insert should fail");

        let url = saved.photo_url.expect("photo url should be set");
        let relative = url.strip_prefix("/storage/photos/").unwrap();
        assert_eq!(photos.read(relative).unwrap(), PNG_BYTES);
        assert_eq!(photo_file_count(&temp.path().join("photos")), 1);
    }

    #[tokio::test]
    async fn test_show_unknown_id() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, _) = setup(&temp).await;

        let err = service.show(42).await.expect_err("unknown id should fail");
        assert!(matches!(err, PatientError::NotFound(42)));
    }

    #[tokio::test]
    async fn test_search_filters_and_paginates() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, _) = setup(&temp).await;

        for i in 0..12 {
            service
                .create(patient(
                    &format!("Paciente {i:02}"),
                    &format!("100000000{i:02}"),
                    &format!("2000000000000{i:02}"),
                ))
                .await
                .unwrap();
        }
        service.create(maria()).await.unwrap();

        let all = service.search(None, 1).await.unwrap();
        assert_eq!(all.total, 13);
        assert_eq!(all.items.len(), 10);
        assert_eq!(all.last_page, 2);
        assert_eq!(all.items[0].full_name, "Maria Silva");

        let blank = service.search(Some("  "), 0).await.unwrap();
        assert_eq!(blank.page, 1);
        assert_eq!(blank, all);

        let second = service.search(Some("paciente"), 2).await.unwrap();
        assert_eq!(second.total, 12);
        assert_eq!(second.items.len(), 2);
        assert_eq!(second.items[1].full_name, "Paciente 11");

        let by_cpf = service.search(Some("1234567"), 1).await.unwrap();
        assert_eq!(by_cpf.total, 1);
        assert_eq!(by_cpf.items[0].full_name, "Maria Silva");

        let by_cns = service.search(Some("200000000000007"), 1).await.unwrap();
        assert_eq!(by_cns.items.len(), 1);
        assert_eq!(by_cns.items[0].full_name, "Paciente 07");

        let none = service.search(Some("zzz"), 1).await.unwrap();
        assert_eq!(none.total, 0);
        assert!(none.items.is_empty());
        assert_eq!(none.last_page, 1);

        let beyond = service.search(None, 5).await.unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 13);
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, _) = setup(&temp).await;
        service.create(maria()).await.unwrap();

        let page = service.search(Some("%"), 1).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_search_ignores_case_of_accented_letters() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, _) = setup(&temp).await;
        let created = service
            .create(patient("JOÃO ÂNGELO", "98765432100", "987654321098765"))
            .await
            .unwrap();
        service.create(maria()).await.unwrap();

        for term in ["JOÃO", "joão", "ângelo", "João Ângelo"] {
            let page = service.search(Some(term), 1).await.unwrap();
            assert_eq!(page.total, 1, "searching {term:?}");
            assert_eq!(page.items[0].id, created.id);
        }

        let mut input = patient("Élida Çarvalho", "98765432100", "987654321098765");
        input.address = maria().address;
        service.update(created.id, input).await.unwrap();

        assert_eq!(service.search(Some("élida"), 1).await.unwrap().total, 1);
        assert_eq!(service.search(Some("joão"), 1).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found_before_validation() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, _) = setup(&temp).await;

        let err = service
            .update(99, PatientInput::default())
            .await
            .expect_err("unknown id should fail");

        assert!(matches!(err, PatientError::NotFound(99)));
        assert_eq!(address_count(&service).await, 0);
    }

    #[tokio::test]
    async fn test_update_reuses_address_by_postal_code_without_changing_it() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, _) = setup(&temp).await;
        let maria = service.create(maria()).await.unwrap();
        let mut input = patient("João Souza", "98765432100", "987654321098765");
        input.address.postal_code = some("20040002");
        let joao = service.create(input).await.unwrap();

        let mut input = patient("João Souza", "98765432100", "987654321098765");
        input.address.street = some("Rua Diferente");
        service.update(joao.id, input).await.expect("update should succeed");

        let updated = service.show(joao.id).await.unwrap();
        assert_eq!(updated.address_id, maria.address_id);
        assert_eq!(updated.address.street, "Praça da Sé");
        assert_eq!(address_count(&service).await, 2);
    }

    #[tokio::test]
    async fn test_update_with_new_postal_code_creates_address() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, _) = setup(&temp).await;
        let created = service.create(maria()).await.unwrap();

        let mut input = maria();
        input.full_name = some("Maria Silva Santos");
        input.address.postal_code = some("30110000");
        input.address.city = some("Belo Horizonte");
        service.update(created.id, input).await.unwrap();

        let updated = service.show(created.id).await.unwrap();
        assert_eq!(updated.full_name, "Maria Silva Santos");
        assert_ne!(updated.address_id, created.address_id);
        assert_eq!(updated.address.city, "Belo Horizonte");
        assert_eq!(address_count(&service).await, 2);
    }

    #[tokio::test]
    async fn test_update_keeps_own_identifiers_and_rejects_others() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, _) = setup(&temp).await;
        let maria = service.create(maria()).await.unwrap();
        service
            .create(patient("João Souza", "98765432100", "987654321098765"))
            .await
            .unwrap();

        service
            .update(maria.id, patient("Maria Silva", "12345678901", "123456789012345"))
            .await
            .expect("own identifiers should be allowed");

        let err = service
            .update(maria.id, patient("Maria Silva", "98765432100", "123456789012345"))
            .await
            .expect_err("another patient's cpf should fail");
        let PatientError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(errors.contains("national_id_cpf"));
        assert!(!errors.contains("national_health_card_cns"));
    }

    #[tokio::test]
    async fn test_update_photo_is_kept_unless_replaced() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, _) = setup(&temp).await;
        let mut input = maria();
        input.photo = Some(PhotoUpload::new(None, PNG_BYTES.to_vec()));
        let created = service.create(input).await.unwrap();

        service.update(created.id, maria()).await.unwrap();

        let updated = service.show(created.id).await.unwrap();
        assert_eq!(updated.photo_url, created.photo_url);
    }

    #[tokio::test]
    async fn test_update_photo_failure_rolls_back_new_address() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let service = setup_with(&temp, Arc::new(BrokenPhotoStore)).await;
        let created = service.create(maria()).await.unwrap();

        let mut input = maria();
        input.full_name = some("Changed");
        input.address.postal_code = some("30110000");
        input.photo = Some(PhotoUpload::new(None, PNG_BYTES.to_vec()));
        let err = service.update(created.id, input).await.expect_err("store should fail");

        assert!(matches!(err, PatientError::Persistence { action: "updating", .. }));
        assert!(err
            .to_string()
            .starts_with("an error occurred while updating the patient:"));
        assert_eq!(address_count(&service).await, 1);
        assert_eq!(service.show(created.id).await.unwrap().full_name, "Maria Silva");
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let (service, _) = setup(&temp).await;
        let created = service.create(maria()).await.unwrap();

        service.delete(created.id).await.expect("first delete should succeed");
        let err = service.delete(created.id).await.expect_err("second delete should fail");

        assert!(matches!(err, PatientError::NotFound(_)));
        assert!(matches!(
            service.show(created.id).await,
            Err(PatientError::NotFound(_))
        ));
        assert_eq!(address_count(&service).await, 1);
    }
}
