// Reference store: the Base and Exception files plus a lazily loaded cache.
//
// The cache is filled on first use and dropped by `ReferenceStore::invalidate`.
// Every accepted update invalidates it before returning, so the next `get`
// reads the new file.

use crate::auth;
use crate::error::{PriceError, Result};
use crate::loader::{ReferenceData, BASE_TABLE, EXCEPTIONS_TABLE};
use crate::schema::{self, BASE_COLUMNS, EXCEPTION_COLUMNS};
use crate::table::{extension_of, read_table, Table};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct ReferenceStore {
    base_path: PathBuf,
    exceptions_path: PathBuf,
    cache: OnceCell<Arc<ReferenceData>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Base,
    Exceptions,
}

impl ReferenceStore {
    pub fn new(base_path: impl Into<PathBuf>, exceptions_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            exceptions_path: exceptions_path.into(),
            cache: OnceCell::new(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn exceptions_path(&self) -> &Path {
        &self.exceptions_path
    }

    /// Cached reference data, loading both files on first call.
    pub fn get(&self) -> Result<Arc<ReferenceData>> {
        self.cache
            .get_or_try_init(|| self.load().map(Arc::new))
            .map(Arc::clone)
    }

    #[cfg(test)]
    pub fn is_cached(&self) -> bool {
        self.cache.get().is_some()
    }

    pub fn invalidate(&mut self) {
        if self.cache.take().is_some() {
            info!("reference cache invalidated");
        }
    }

    fn load(&self) -> Result<ReferenceData> {
        debug!(
            base = %self.base_path.display(),
            exceptions = %self.exceptions_path.display(),
            "loading reference data"
        );
        let base = read_reference(&self.base_path)?;
        let exceptions = read_reference(&self.exceptions_path)?;
        ReferenceData::from_tables(&base, &exceptions).map_err(|e| match e {
            PriceError::MissingColumns { ref table, .. } if table == EXCEPTIONS_TABLE => {
                unavailable(&self.exceptions_path, &e)
            }
            PriceError::MissingColumns { .. } => unavailable(&self.base_path, &e),
            other => other,
        })
    }

    /// Replace the Base file. The upload must carry exactly the Base columns.
    pub fn update_base(&mut self, code: &str, upload: &Path) -> Result<()> {
        self.update(Kind::Base, code, upload)
    }

    /// Replace the Exception file. The upload must carry the service number column.
    pub fn update_exceptions(&mut self, code: &str, upload: &Path) -> Result<()> {
        self.update(Kind::Exceptions, code, upload)
    }

    fn update(&mut self, kind: Kind, code: &str, upload: &Path) -> Result<()> {
        if let Err(e) = auth::authorize(code) {
            warn!(?kind, "reference update rejected: invalid authorization code");
            return Err(e);
        }

        let target = match kind {
            Kind::Base => self.base_path.clone(),
            Kind::Exceptions => self.exceptions_path.clone(),
        };
        let expected = extension_of(&target);
        let found = extension_of(upload);
        if expected != found {
            return Err(PriceError::FormatMismatch { expected, found });
        }

        let table = read_table(upload)?;
        check_upload(kind, &table)?;
        replace_file(upload, &target)?;
        info!(
            ?kind,
            rows = table.len(),
            path = %target.display(),
            "reference file replaced"
        );
        self.invalidate();
        Ok(())
    }
}

fn check_upload(kind: Kind, table: &Table) -> Result<()> {
    match kind {
        Kind::Base => schema::validate_exact(table, &BASE_COLUMNS, BASE_TABLE),
        Kind::Exceptions => schema::require_columns(table, &EXCEPTION_COLUMNS, EXCEPTIONS_TABLE),
    }
}

fn read_reference(path: &Path) -> Result<Table> {
    read_table(path).map_err(|e| unavailable(path, &e))
}

fn unavailable(path: &Path, e: &PriceError) -> PriceError {
    PriceError::ReferenceUnavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Copy next to the target first, then rename over it.
fn replace_file(src: &Path, target: &Path) -> Result<()> {
    if src == target {
        return Ok(());
    }
    let mut staging = target.as_os_str().to_owned();
    staging.push(".upload");
    let staging = PathBuf::from(staging);
    std::fs::copy(src, &staging)?;
    if let Err(e) = std::fs::rename(&staging, target) {
        let _ = std::fs::remove_file(&staging);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TEST_CODE;
    use tempfile::TempDir;

    const BASE_V1: &str = "Empresa;Equipamento;Descrição do Material;MAX_PU;MIN_PU\nA;M1;Cabo;11;9\n";
    const BASE_V2: &str = "Empresa;Equipamento;Descrição do Material;MAX_PU;MIN_PU\nA;M1;Cabo;20;15\nA;M2;Tubo;5;1\n";
    const EXC_V1: &str = "Nº serviço;Obs\nM9;frete\n";

    struct Fixture {
        dir: TempDir,
        store: ReferenceStore,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let base = dir.path().join("Base.csv");
            let exc = dir.path().join("Excecoes.csv");
            std::fs::write(&base, BASE_V1).unwrap();
            std::fs::write(&exc, EXC_V1).unwrap();
            let store = ReferenceStore::new(base, exc);
            Self { dir, store }
        }

        fn upload(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, content).unwrap();
            path
        }
    }

    #[test]
    fn loads_lazily_and_serves_from_cache() {
        let fx = Fixture::new();
        assert!(!fx.store.is_cached());
        let first = fx.store.get().unwrap();
        assert!(fx.store.is_cached());
        assert_eq!(first.base.lookup("M1").unwrap().max_pu, Some(11.0));
        assert!(first.exceptions.contains("M9"));

        // Changing the file behind the store's back is not observed until invalidation.
        std::fs::write(fx.store.base_path(), BASE_V2).unwrap();
        let second = fx.store.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn authorized_update_replaces_file_and_invalidates() {
        let mut fx = Fixture::new();
        fx.store.get().unwrap();
        let upload = fx.upload("nova_base.csv", BASE_V2);

        fx.store.update_base(TEST_CODE, &upload).unwrap();

        assert!(!fx.store.is_cached());
        let data = fx.store.get().unwrap();
        assert_eq!(data.base.lookup("M1").unwrap().max_pu, Some(20.0));
        assert!(data.base.lookup("M2").is_some());
    }

    #[test]
    fn unauthorized_update_leaves_data_untouched() {
        let mut fx = Fixture::new();
        fx.store.get().unwrap();
        let upload = fx.upload("nova_base.csv", BASE_V2);

        let err = fx.store.update_base("0000", &upload).unwrap_err();
        assert!(matches!(err, PriceError::Unauthorized));
        assert!(fx.store.is_cached());
        assert_eq!(std::fs::read_to_string(fx.store.base_path()).unwrap(), BASE_V1);
    }

    #[test]
    fn base_upload_with_extra_column_is_rejected() {
        let mut fx = Fixture::new();
        let upload = fx.upload(
            "nova_base.csv",
            "Empresa;Equipamento;Descrição do Material;MAX_PU;MIN_PU;Obs\nA;M1;Cabo;1;1;x\n",
        );
        let err = fx.store.update_base(TEST_CODE, &upload).unwrap_err();
        match err {
            PriceError::SchemaMismatch { extra, missing, .. } => {
                assert_eq!(extra, vec!["Obs".to_string()]);
                assert!(missing.is_empty());
            }
            other => panic!("expected schema mismatch, got {other:?}"),
        }
        assert_eq!(std::fs::read_to_string(fx.store.base_path()).unwrap(), BASE_V1);
    }

    #[test]
    fn upload_must_share_backing_extension() {
        let mut fx = Fixture::new();
        let upload = fx.upload("nova_base.xlsx", "not really a workbook");
        assert!(matches!(
            fx.store.update_base(TEST_CODE, &upload),
            Err(PriceError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn exception_update_accepts_extra_columns() {
        let mut fx = Fixture::new();
        let upload = fx.upload("excecoes_nova.csv", "Obs;Nº serviço;Centro\nx;M7;C1\n");
        fx.store.update_exceptions(TEST_CODE, &upload).unwrap();
        let data = fx.store.get().unwrap();
        assert!(data.exceptions.contains("M7"));
        assert!(!data.exceptions.contains("M9"));
    }

    #[test]
    fn missing_reference_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReferenceStore::new(dir.path().join("Base.csv"), dir.path().join("Exc.csv"));
        match store.get() {
            Err(PriceError::ReferenceUnavailable { path, .. }) => {
                assert!(path.ends_with("Base.csv"));
            }
            other => panic!("expected unavailable reference, got {other:?}"),
        }
        assert!(!store.is_cached());
    }

    #[test]
    fn exception_file_without_key_column_is_reported() {
        let fx = Fixture::new();
        std::fs::write(fx.store.exceptions_path(), "Material\nM9\n").unwrap();
        match fx.store.get() {
            Err(PriceError::ReferenceUnavailable { path, .. }) => {
                assert!(path.ends_with("Excecoes.csv"));
            }
            other => panic!("expected unavailable reference, got {other:?}"),
        }
    }
}
