//! Store key layout
//!
//! Maps a log kind and page number to the key of the matching document.
//! Keys look like `{data_domain}/{owner}/{kind}/page_{n}.json`.

use std::collections::HashMap;

use crate::error::StorageError;
use crate::model::LogKind;

/// Placeholder substituted with the decimal page number
pub const PAGE_REF: &str = "[NUM]";

/// Default data domain all keys live under
pub const DEFAULT_DATA_DOMAIN: &str = "crqa.hns";

#[derive(Debug, Clone, PartialEq, Eq)]
struct KindPaths {
    index: String,
    page_template: String,
}

/// Deterministic mapping from (kind, page number) to store keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathScheme {
    data_domain: String,
    owner: String,
    registry: String,
    kinds: HashMap<LogKind, KindPaths>,
}

impl PathScheme {
    /// Create the default layout for `owner` under `data_domain`
    ///
    /// A trailing `/` on either argument is ignored.
    pub fn new(
        data_domain: impl Into<String>,
        owner: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let data_domain = trim_slash(data_domain.into());
        let owner = trim_slash(owner.into());

        if data_domain.is_empty() || owner.is_empty() {
            return Err(StorageError::InvalidConfig(
                "data domain and owner must not be empty".into(),
            ));
        }

        let kinds = LogKind::ALL
            .iter()
            .map(|kind| {
                let base = format!("{}/{}/{}", data_domain, owner, kind.dir_name());
                let paths = KindPaths {
                    index: format!("{}/index.json", base),
                    page_template: format!("{}/page_{}.json", base, PAGE_REF),
                };
                (*kind, paths)
            })
            .collect();

        Ok(Self {
            registry: format!("{}/skapps.json", data_domain),
            data_domain,
            owner,
            kinds,
        })
    }

    /// Replace the page template of one kind
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemplate` if the template has no `[NUM]` placeholder.
    pub fn with_page_template(
        mut self,
        kind: LogKind,
        template: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let template = template.into();
        if !template.contains(PAGE_REF) {
            return Err(StorageError::InvalidTemplate(template));
        }
        if let Some(paths) = self.kinds.get_mut(&kind) {
            paths.page_template = template;
        }
        Ok(self)
    }

    /// Key of the owner dictionary, shared by every owner and kind
    pub fn registry_path(&self) -> &str {
        &self.registry
    }

    /// Key of the index document for `kind`
    pub fn index_path(&self, kind: LogKind) -> &str {
        &self.kind_paths(kind).index
    }

    /// Key of page `page_number` for `kind`
    pub fn page_path(&self, kind: LogKind, page_number: u64) -> String {
        self.kind_paths(kind)
            .page_template
            .replace(PAGE_REF, &page_number.to_string())
    }

    /// Data domain every key lives under
    pub fn data_domain(&self) -> &str {
        &self.data_domain
    }

    /// Owner whose logs these keys address
    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn kind_paths(&self, kind: LogKind) -> &KindPaths {
        // Every LogKind is inserted by the constructor
        &self.kinds[&kind]
    }
}

fn trim_slash(mut value: String) -> String {
    while value.ends_with('/') {
        value.pop();
    }
    value
}
