use super::*;

/// Ordered URL -> record mapping. Order is insertion order; overwriting keeps the
/// existing position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(super) struct LinkMap {
    records: Vec<LinkRecord>,
}

impl LinkMap {
    pub(super) fn len(&self) -> usize {
        self.records.len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(super) fn iter(&self) -> impl Iterator<Item = &LinkRecord> {
        self.records.iter()
    }

    pub(super) fn get(&self, url: &str) -> Option<&LinkRecord> {
        self.records.iter().find(|record| record.url == url)
    }

    /// Zero-based positional lookup.
    pub(super) fn get_index(&self, index: usize) -> Option<&LinkRecord> {
        self.records.get(index)
    }

    pub(super) fn upsert(&mut self, record: LinkRecord) {
        match self.records.iter_mut().find(|existing| existing.url == record.url) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    pub(super) fn remove(&mut self, url: &str) -> Option<LinkRecord> {
        let pos = self.records.iter().position(|record| record.url == url)?;
        Some(self.records.remove(pos))
    }

    fn to_json(&self) -> Result<Vec<u8>> {
        let mut doc = serde_json::Map::new();
        for record in &self.records {
            let value = serde_json::to_value(StoredLinkRef {
                metadata: &record.metadata,
                timestamp: &record.timestamp,
            })
            .with_context(|| format!("serialize record {}", record.url))?;
            doc.insert(record.url.clone(), value);
        }
        serde_json::to_vec_pretty(&doc).context("serialize links")
    }
}

impl FromIterator<LinkRecord> for LinkMap {
    fn from_iter<I: IntoIterator<Item = LinkRecord>>(iter: I) -> Self {
        let mut map = LinkMap::default();
        for record in iter {
            map.upsert(record);
        }
        map
    }
}

#[derive(Serialize)]
struct StoredLinkRef<'a> {
    metadata: &'a LinkMetadata,
    timestamp: &'a str,
}

#[derive(Deserialize)]
struct StoredLink {
    #[serde(default)]
    metadata: Option<StoredMetadata>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Deserialize, Default)]
struct StoredMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl StoredLink {
    fn into_record(self, url: String) -> LinkRecord {
        let metadata = self.metadata.unwrap_or_default();
        LinkRecord {
            url,
            metadata: LinkMetadata {
                title: metadata.title.unwrap_or_default(),
                description: metadata.description.unwrap_or_default(),
            },
            timestamp: self.timestamp.unwrap_or_default(),
        }
    }
}

/// The JSON-file backed link database. Reads go straight to disk; every mutation is a
/// locked read-modify-write followed by an atomic replace of the file.
pub(super) struct LinkStore {
    path: PathBuf,
    write_lock: Mutex<()>,
    persist: Box<PersistFn>,
}

type PersistFn = dyn Fn(&Path, &LinkMap) -> Result<()> + Send + Sync;

impl LinkStore {
    pub(super) fn new(path: PathBuf) -> Self {
        LinkStore {
            path,
            write_lock: Mutex::new(()),
            persist: Box::new(write_links),
        }
    }

    /// Same store, but every write goes through `persist` instead of `write_links`.
    #[cfg(test)]
    pub(super) fn with_persist<F>(path: PathBuf, persist: F) -> Self
    where
        F: Fn(&Path, &LinkMap) -> Result<()> + Send + Sync + 'static,
    {
        LinkStore {
            path,
            write_lock: Mutex::new(()),
            persist: Box::new(persist),
        }
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }

    pub(super) fn load_all(&self) -> Result<LinkMap> {
        read_links(&self.path)
    }

    pub(super) fn get(&self, url: &str) -> Result<Option<LinkRecord>> {
        Ok(read_links(&self.path)?.get(url).cloned())
    }

    pub(super) async fn upsert(&self, url: &str, metadata: LinkMetadata) -> Result<LinkRecord> {
        let _guard = self.write_lock.lock().await;
        let mut links = read_links(&self.path)?;
        let record = LinkRecord {
            url: url.to_string(),
            metadata,
            timestamp: now_iso8601(),
        };
        links.upsert(record.clone());
        with_retries(|| (self.persist)(&self.path, &links)).await?;
        Ok(record)
    }

    pub(super) async fn delete_one(&self, url: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut links = read_links(&self.path)?;
        if links.remove(url).is_none() {
            return Ok(false);
        }
        with_retries(|| (self.persist)(&self.path, &links)).await?;
        Ok(true)
    }

    /// Removes every listed URL that is still present and returns those, in request
    /// order. The file is written once, and only if something was removed.
    pub(super) async fn delete_many(&self, urls: &[String]) -> Result<Vec<String>> {
        let _guard = self.write_lock.lock().await;
        let mut links = read_links(&self.path)?;
        let mut removed = Vec::new();
        for url in urls {
            if links.remove(url).is_some() {
                removed.push(url.clone());
            }
        }
        if !removed.is_empty() {
            with_retries(|| (self.persist)(&self.path, &links)).await?;
        }
        Ok(removed)
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(super) async fn clear_all(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        with_retries(|| (self.persist)(&self.path, &LinkMap::default())).await
    }
}

pub(super) fn read_links(path: &Path) -> Result<LinkMap> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(LinkMap::default()),
        Err(err) => return Err(err).with_context(|| format!("read links {}", path.display())),
    };
    let parsed = String::from_utf8(bytes)
        .context("links file is not UTF-8")
        .and_then(|contents| parse_links(&contents));
    Ok(parsed.unwrap_or_else(|err| {
        warn!("treating {} as empty: {:#}", path.display(), err);
        LinkMap::default()
    }))
}

pub(super) fn parse_links(contents: &str) -> Result<LinkMap> {
    let doc: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(contents).context("parse links")?;
    let mut links = LinkMap::default();
    for (url, value) in doc {
        match serde_json::from_value::<StoredLink>(value) {
            Ok(stored) => links.upsert(stored.into_record(url)),
            Err(err) => warn!("skipping malformed record {}: {}", url, err),
        }
    }
    Ok(links)
}

pub(super) fn write_links(path: &Path, links: &LinkMap) -> Result<()> {
    let data = links.to_json()?;
    atomic_write(path, &data)
}

pub(super) fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(data).context("write temp file")?;
    tmp.flush().context("flush temp file")?;
    tmp.as_file_mut().sync_all().context("sync temp file")?;
    tmp.persist(path)
        .map_err(|e| anyhow!("persist temp file: {}", e))?;
    Ok(())
}
