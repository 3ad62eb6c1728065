//! The dataset table: which files make up each `(repository, name, version)`
//! and which options the engine needs to read them.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use serde::{Deserialize, Serialize};

use super::errors::RetrievalError;
use crate::graph::GraphOptions;

/// What to retrieve, and how to interpret it once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescriptor {
    pub name: String,
    pub repository: String,
    pub version: String,
    pub directed: bool,
    pub preprocess: bool,
    /// `false` forces a fresh download and preprocessing pass.
    pub cache: bool,
}

impl DatasetDescriptor {
    pub fn new<N: Into<String>, R: Into<String>, V: Into<String>>(
        name: N,
        repository: R,
        version: V,
    ) -> Self {
        Self {
            name: name.into(),
            repository: repository.into(),
            version: version.into(),
            directed: false,
            preprocess: true,
            cache: true,
        }
    }

    pub fn directed(mut self, directed: bool) -> Self {
        self.directed = directed;
        self
    }

    pub fn preprocess(mut self, preprocess: bool) -> Self {
        self.preprocess = preprocess;
        self
    }

    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub url: String,
    /// Where to place the file (or unpack the archive) inside the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Lower-case hex md5 of the downloaded bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl RemoteFile {
    pub fn new<U: Into<String>>(url: U) -> Self {
        Self {
            url: url.into(),
            path: None,
            md5: None,
            size: None,
        }
    }

    pub fn with_path<P: Into<String>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_md5<S: Into<String>>(mut self, md5: S) -> Self {
        self.md5 = Some(md5.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSource {
    pub files: Vec<RemoteFile>,
    #[serde(default)]
    pub arguments: GraphOptions,
}

type Versions = BTreeMap<String, GraphSource>;

/// `{ repository: { name: { version: source } } }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog(BTreeMap<String, BTreeMap<String, Versions>>);

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, RetrievalError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RetrievalError> {
        Ok(serde_json::from_reader(BufReader::new(reader))?)
    }

    /// Loads a JSON catalog, gunzipping it first when the path ends in `.gz`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, RetrievalError> {
        let path = path.as_ref();
        let f = File::open(path)?;
        if path.extension().is_some_and(|ext| ext == "gz") {
            Self::from_reader(flate2::read::GzDecoder::new(f))
        } else {
            Self::from_reader(f)
        }
    }

    pub fn insert<R, N, V>(&mut self, repository: R, name: N, version: V, source: GraphSource)
    where
        R: Into<String>,
        N: Into<String>,
        V: Into<String>,
    {
        self.0
            .entry(repository.into())
            .or_default()
            .entry(name.into())
            .or_default()
            .insert(version.into(), source);
    }

    pub fn source(
        &self,
        repository: &str,
        name: &str,
        version: &str,
    ) -> Result<&GraphSource, RetrievalError> {
        self.0
            .get(repository)
            .and_then(|graphs| graphs.get(name))
            .and_then(|versions| versions.get(version))
            .ok_or_else(|| RetrievalError::UnknownGraph {
                repository: repository.to_string(),
                name: name.to_string(),
                version: version.to_string(),
            })
    }

    pub fn repositories(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn graph_names<'a>(&'a self, repository: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .get(repository)
            .into_iter()
            .flat_map(|graphs| graphs.keys().map(String::as_str))
    }

    pub fn versions<'a>(
        &'a self,
        repository: &str,
        name: &str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .get(repository)
            .and_then(|graphs| graphs.get(name))
            .into_iter()
            .flat_map(|versions| versions.keys().map(String::as_str))
    }

    /// `preferred` when listed for this graph, else the last version in lexical order.
    pub fn default_version(
        &self,
        repository: &str,
        name: &str,
        preferred: Option<&str>,
    ) -> Option<&str> {
        let versions = self.0.get(repository)?.get(name)?;
        match preferred {
            Some(v) if versions.contains_key(v) => versions.get_key_value(v).map(|(k, _)| k.as_str()),
            _ => versions.keys().next_back().map(String::as_str),
        }
    }
}
