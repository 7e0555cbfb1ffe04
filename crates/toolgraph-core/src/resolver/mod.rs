//! Reference resolution.
//!
//! The resolver starts at the entry tool and follows references: a
//! source is fetched, classified and parsed once, and only the tools
//! reached from the entry join the tool set. References of a tool are
//! resolved concurrently. Each `load` owns its own memo table, so a
//! location is fetched at most once per call and nothing is shared
//! between calls.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, try_join_all};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::assemble;
use crate::config::LoaderConfig;
use crate::error::{LoadError, Result};
use crate::openapi::{self, SourceFormat};
use crate::parser::{self, ParsedSource};
use crate::program::{Program, Tool, ToolSet};
use crate::source::{DefaultFetcher, Fetcher, Location, Source, ToolRef, split_tool_ref};

type Memo = HashMap<Location, Arc<OnceCell<Arc<ParsedSource>>>>;

/// Loads programs from references.
pub struct Resolver {
    fetcher: Arc<dyn Fetcher>,
    config: LoaderConfig,
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: LoaderConfig) -> Self {
        Self { fetcher, config }
    }

    /// Resolver backed by the filesystem and HTTP.
    pub fn with_default_fetcher(config: LoaderConfig) -> Result<Self> {
        let fetcher = DefaultFetcher::new(&config)?;
        Ok(Self::new(Arc::new(fetcher), config))
    }

    /// Load the program rooted at `reference`.
    ///
    /// A sub tool named inside the reference (`name from file`) takes
    /// precedence over `sub_tool`. Relative references are joined onto
    /// `base`, or the configured working directory when `base` is `None`.
    pub async fn load(&self, reference: &str, sub_tool: &str, base: Option<&str>) -> Result<Program> {
        self.load_with_cancel(reference, sub_tool, base, CancellationToken::new())
            .await
    }

    /// Like [`load`](Self::load), aborting when `cancel` fires.
    pub async fn load_with_cancel(
        &self,
        reference: &str,
        sub_tool: &str,
        base: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<Program> {
        let (tool, embedded) = split_tool_ref(reference);
        let sub_tool = if embedded.is_empty() {
            sub_tool.to_string()
        } else {
            embedded
        };

        let default_dir = self.default_dir()?;
        let location = Location::resolve(&tool, base, &default_dir)?;
        tracing::debug!(%reference, %location, %sub_tool, "loading program");

        let state = ResolveState::new(self, default_dir);
        let resolution = async {
            let entry = state.resolve_location(location, None, sub_tool).await?;
            state.finish(reference, entry)
        };

        self.run(resolution, cancel).await
    }

    /// Load a program whose root is an in-memory source.
    pub async fn load_source(&self, source: Source, sub_tool: &str) -> Result<Program> {
        let name = source.location.to_string();
        let state = ResolveState::new(self, self.default_dir()?);
        let resolution = async {
            let location = source.location.clone();
            let entry = state
                .resolve_location(location, Some(source), sub_tool.to_string())
                .await?;
            state.finish(&name, entry)
        };

        self.run(resolution, CancellationToken::new()).await
    }

    fn default_dir(&self) -> Result<PathBuf> {
        match &self.config.working_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    /// Drive a resolution under the configured timeout and the caller's token.
    async fn run<F>(&self, resolution: F, cancel: CancellationToken) -> Result<Program>
    where
        F: Future<Output = Result<Program>>,
    {
        let bounded = async {
            match self.config.resolve_timeout() {
                Some(limit) => tokio::time::timeout(limit, resolution)
                    .await
                    .map_err(|_| LoadError::Cancelled {
                        reason: format!("timed out after {}s", limit.as_secs()),
                    })?,
                None => resolution.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LoadError::Cancelled {
                reason: "cancelled by caller".to_string(),
            }),
            result = bounded => result,
        }
    }
}

/// State of a single `load` call.
struct ResolveState<'r> {
    fetcher: &'r dyn Fetcher,
    default_model: &'r str,
    default_dir: PathBuf,
    memo: Mutex<Memo>,
    tool_set: Mutex<ToolSet>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<'r> ResolveState<'r> {
    fn new(resolver: &'r Resolver, default_dir: PathBuf) -> Self {
        Self {
            fetcher: resolver.fetcher.as_ref(),
            default_model: &resolver.config.default_model,
            default_dir,
            memo: Mutex::new(HashMap::new()),
            tool_set: Mutex::new(ToolSet::new()),
        }
    }

    /// Resolve a location to the id of its selected tool, pulling that
    /// tool and everything it reaches into the tool set.
    fn resolve_location<'a>(
        &'a self,
        location: Location,
        preloaded: Option<Source>,
        sub_tool: String,
    ) -> BoxFuture<'a, Result<String>> {
        async move {
            let parsed = self.parsed(location, preloaded).await?;
            let entry = parsed.entry_id(&sub_tool)?.to_string();
            self.include(&parsed, &entry).await?;
            Ok(entry)
        }
        .boxed()
    }

    /// Fetch and parse a location once per load.
    async fn parsed(&self, location: Location, preloaded: Option<Source>) -> Result<Arc<ParsedSource>> {
        let cell = {
            let mut memo = lock(&self.memo);
            memo.entry(location.clone()).or_default().clone()
        };

        if let Some(parsed) = cell.get() {
            tracing::debug!(location = %parsed.location, "source already parsed");
            return Ok(parsed.clone());
        }

        let parsed = cell
            .get_or_try_init(|| async move {
                let source = match preloaded {
                    Some(source) => source,
                    None => self.fetcher.fetch(&location).await?,
                };
                self.parse(source)
            })
            .await?;
        Ok(parsed.clone())
    }

    fn parse(&self, source: Source) -> Result<Arc<ParsedSource>> {
        let parsed = match openapi::detect_format(&source.content) {
            SourceFormat::Native => parser::parse(&source, self.default_model)?,
            SourceFormat::OpenApi(version) => {
                openapi::convert(&source, version, self.default_model)?
            }
            SourceFormat::Assembled => assemble::artifact_source(&source)?,
        };

        tracing::debug!(
            location = %parsed.location,
            tools = parsed.tools.len(),
            linked = parsed.linked,
            "parsed source"
        );
        Ok(Arc::new(parsed))
    }

    /// Add one tool of a parsed source to the tool set and link it.
    ///
    /// The tool is inserted before its references are followed, so a
    /// second visit returns at once. That is what lets cycles terminate.
    fn include<'a>(&'a self, parsed: &'a ParsedSource, id: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            let tool = parsed.tool(id)?;
            {
                let mut tool_set = lock(&self.tool_set);
                if tool_set.contains_key(id) {
                    return Ok(());
                }
                tool_set.insert(id.to_string(), tool.clone());
            }

            if parsed.linked {
                try_join_all(
                    tool.tool_mapping
                        .values()
                        .map(|target| self.include(parsed, target)),
                )
                .await?;
                return Ok(());
            }
            self.link_tool(parsed, tool).await
        }
        .boxed()
    }

    async fn link_tool(&self, parsed: &ParsedSource, tool: &Tool) -> Result<()> {
        if tool.tools.is_empty() {
            return Ok(());
        }

        let targets = try_join_all(tool.tools.iter().map(|raw| async move {
            let target = self
                .resolve_reference(parsed, tool, raw)
                .await
                .map_err(|e| e.in_reference(&tool.id, raw))?;
            Ok::<_, LoadError>((raw.clone(), target))
        }))
        .await?;

        let mut tool_set = lock(&self.tool_set);
        if let Some(entry) = tool_set.get_mut(&tool.id) {
            entry.tool_mapping.extend(targets);
        }
        Ok(())
    }

    async fn resolve_reference(&self, parsed: &ParsedSource, tool: &Tool, raw: &str) -> Result<String> {
        let reference = ToolRef::parse(raw);

        // siblings in the same source resolve without a fetch
        if !reference.has_sub_tool()
            && let Some(id) = tool.local_tools.get(&reference.tool)
        {
            self.include(parsed, id).await?;
            return Ok(id.clone());
        }

        let location = Location::resolve(
            &reference.tool,
            Some(tool.working_dir.as_str()),
            &self.default_dir,
        )?;
        self.resolve_location(location, None, reference.sub_tool)
            .await
    }

    fn finish(&self, name: &str, entry: String) -> Result<Program> {
        let tool_set = std::mem::take(&mut *lock(&self.tool_set));
        let sources = lock(&self.memo).len();

        let program = Program::new(name, entry, tool_set)?;
        tracing::info!(
            program = %name,
            entry = %program.entry_tool_id(),
            tools = program.tool_set().len(),
            sources,
            "program loaded"
        );
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves sources from a map keyed by location string.
    #[derive(Default)]
    struct MapFetcher {
        files: BTreeMap<String, String>,
        fetches: AtomicUsize,
    }

    impl MapFetcher {
        fn with(files: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                files: files
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                fetches: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Fetcher for MapFetcher {
        async fn fetch(&self, location: &Location) -> Result<Source> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let key = location.to_string();
            match self.files.get(&key) {
                Some(text) => Ok(Source::inline(location.clone(), text)),
                None => Err(LoadError::source_not_found(key, "no such file")),
            }
        }
    }

    fn resolver(fetcher: Arc<MapFetcher>) -> Resolver {
        let config = LoaderConfig {
            working_dir: Some(PathBuf::from("/work")),
            ..LoaderConfig::default()
        };
        Resolver::new(fetcher, config)
    }

    #[tokio::test]
    async fn test_sibling_reference_is_not_fetched() {
        let fetcher = MapFetcher::with(&[(
            "/work/a.gpt",
            "tools: helper\n\nuse it\n---\nname: helper\n\nhelp",
        )]);
        let program = resolver(fetcher.clone())
            .load("a.gpt", "", None)
            .await
            .unwrap();

        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
        let target = program.referenced_tool("/work/a.gpt:1", "helper").unwrap();
        assert_eq!(target.id, "/work/a.gpt:5");
    }

    #[tokio::test]
    async fn test_subtool_in_reference_wins() {
        let fetcher = MapFetcher::with(&[(
            "/work/a.gpt",
            "first\n---\nname: second\n\nsecond",
        )]);
        let program = resolver(fetcher)
            .load("second from a.gpt", "first", None)
            .await
            .unwrap();
        assert_eq!(program.entry_tool_id(), "/work/a.gpt:3");
        assert_eq!(program.name(), "second from a.gpt");
    }

    #[tokio::test]
    async fn test_reference_with_subtool_fetches_other_source() {
        let fetcher = MapFetcher::with(&[
            ("/work/a.gpt", "tools: lister from ./lib/tools.gpt\n\nlist"),
            ("/work/lib/tools.gpt", "name: other\n\no\n---\nname: lister\n\nl"),
        ]);
        let program = resolver(fetcher).load("a.gpt", "", None).await.unwrap();

        let target = program
            .referenced_tool("/work/a.gpt:1", "lister from ./lib/tools.gpt")
            .unwrap();
        assert_eq!(target.id, "/work/lib/tools.gpt:5");
        assert_eq!(target.working_dir, "/work/lib");
    }

    #[tokio::test]
    async fn test_load_source_inline() {
        let fetcher = MapFetcher::with(&[("/work/bob.gpt", "Say hello")]);
        let source = Source::inline(
            Location::Local(PathBuf::from("/work/inline.gpt")),
            "tools: bob.gpt\n\ncall bob",
        );

        let program = resolver(fetcher.clone())
            .load_source(source, "")
            .await
            .unwrap();

        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(program.entry_tool_id(), "/work/inline.gpt:1");
        assert!(program.tool("/work/bob.gpt:1").is_some());
    }

    #[tokio::test]
    async fn test_parse_error_is_wrapped_with_referrer() {
        let fetcher = MapFetcher::with(&[
            ("/work/a.gpt", "tools: b.gpt\n\ncall b"),
            ("/work/b.gpt", "name: b\ntemperature: hot\n\nx"),
        ]);
        let err = resolver(fetcher).load("a.gpt", "", None).await.unwrap_err();

        match &err {
            LoadError::ReferenceResolution {
                from_tool_id,
                raw_ref,
                ..
            } => {
                assert_eq!(from_tool_id, "/work/a.gpt:1");
                assert_eq!(raw_ref, "b.gpt");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(err.root_cause(), LoadError::Parse { line: 2, .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fetcher = MapFetcher::with(&[("/work/a.gpt", "hi")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = resolver(fetcher)
            .load_with_cancel("a.gpt", "", None, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Cancelled { .. }));
    }
}
