/// Returns a cached value for `$key`, or awaits `$block`, queues the result
/// for caching with `$ttl` seconds and returns it.
///
/// Must be used in a function returning `AppResult`.
///
/// ```rust,ignore
/// cached!(cache, CacheKey::Genres { language }, GENRES_CACHE_TTL, async move {
///     fetch_genres().await
/// })
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        match $cache.get_from_cache(&key).await {
            Ok(Some(cached)) => Ok(cached),
            result => {
                if let Err(e) = result {
                    tracing::warn!(key = %key, error = %e, "Cache read failed, fetching upstream");
                }
                let value = $block.await?;
                $cache.set_in_background(&key, &value, $ttl);
                Ok(value)
            }
        }
    }};
}
