//! Multi-endpoint dispatch.
//!
//! A [`Client`] opens one [`ServerConnection`] per configured location (all
//! in parallel) and routes every operation to a single endpoint chosen by
//! weighted random draw: pick `r ∈ [0, Σw)`, walk the endpoints subtracting
//! weights until the draw lands. There is no retry against another endpoint;
//! a failed operation surfaces to the caller as-is.
//!
//! Weights are uniform `1/N` unless the caller hands in an explicit mapping
//! through [`Locations::Weighted`].

use rand::Rng;
use tracing::debug;

use crate::client::connection::{ClientOptions, ServerConnection};
use crate::error::{Error, Result};
use crate::protocol::types::Value;

/// Where a client should connect.
#[derive(Debug, Clone)]
pub enum Locations {
    /// One `"host:port"`.
    Single(String),
    /// Several locations, dispatched uniformly.
    List(Vec<String>),
    /// Locations with caller-chosen dispatch weights.
    Weighted(Vec<(String, f64)>),
}

impl From<&str> for Locations {
    fn from(location: &str) -> Locations {
        Locations::Single(location.to_string())
    }
}

impl From<Vec<String>> for Locations {
    fn from(locations: Vec<String>) -> Locations {
        Locations::List(locations)
    }
}

impl Locations {
    fn into_pairs(self) -> Vec<(String, Option<f64>)> {
        match self {
            Locations::Single(location) => vec![(location, None)],
            Locations::List(locations) => {
                locations.into_iter().map(|l| (l, None)).collect()
            }
            Locations::Weighted(weighted) => weighted
                .into_iter()
                .map(|(l, w)| (l, Some(w)))
                .collect(),
        }
    }
}

struct WeightedConnection {
    connection: ServerConnection,
    weight: f64,
}

/// A cache client spread over one or more server endpoints.
pub struct Client {
    servers: Vec<WeightedConnection>,
}

impl Client {
    /// Opens a connection to every location in parallel. Any individual
    /// connect failure fails the whole construction with that error.
    pub async fn connect(locations: impl Into<Locations>, options: ClientOptions) -> Result<Client> {
        let pairs = locations.into().into_pairs();
        if pairs.is_empty() {
            return Err(Error::BadEndpoint("no locations given".to_string()));
        }
        let count = pairs.len();

        let mut pending = Vec::with_capacity(count);
        for (location, weight) in pairs {
            let options = options.clone();
            pending.push(tokio::spawn(async move {
                let connection = ServerConnection::connect(&location, &options).await?;
                Ok::<_, Error>((connection, weight))
            }));
        }

        let mut servers = Vec::with_capacity(count);
        for task in pending {
            let (connection, weight) = task
                .await
                .map_err(|join_error| {
                    Error::Io(std::io::Error::new(std::io::ErrorKind::Other, join_error))
                })??;
            servers.push(WeightedConnection {
                connection,
                weight: weight.unwrap_or(1.0 / count as f64),
            });
        }

        debug!(endpoints = servers.len(), "client connected");
        Ok(Client { servers })
    }

    fn pick(&mut self) -> &mut ServerConnection {
        let weights: Vec<f64> = self.servers.iter().map(|s| s.weight).collect();
        let total: f64 = weights.iter().sum();
        let draw = rand::thread_rng().gen_range(0.0..total.max(f64::MIN_POSITIVE));
        let index = weighted_index(&weights, draw);
        &mut self.servers[index].connection
    }

    /// Retrieves a value from one endpoint.
    pub async fn get(&mut self, key: &str) -> Result<Option<Value>> {
        self.pick().get(key).await
    }

    /// Stores a value on one endpoint.
    pub async fn set(&mut self, key: &str, value: &Value, exptime: i64) -> Result<bool> {
        self.pick().set(key, value, exptime).await
    }

    /// Stores only if the chosen endpoint does not hold the key.
    pub async fn add(&mut self, key: &str, value: &Value, exptime: i64) -> Result<bool> {
        self.pick().add(key, value, exptime).await
    }

    /// Stores only if the chosen endpoint already holds the key.
    pub async fn replace(&mut self, key: &str, value: &Value, exptime: i64) -> Result<bool> {
        self.pick().replace(key, value, exptime).await
    }

    /// Appends to a value on one endpoint.
    pub async fn append(&mut self, key: &str, value: &Value) -> Result<bool> {
        self.pick().append(key, value).await
    }

    /// Prefixes a value on one endpoint.
    pub async fn prepend(&mut self, key: &str, value: &Value) -> Result<bool> {
        self.pick().prepend(key, value).await
    }

    /// Deletes a key on one endpoint.
    pub async fn delete(&mut self, key: &str) -> Result<bool> {
        self.pick().delete(key).await
    }

    /// Increments a counter on one endpoint.
    pub async fn incr(&mut self, key: &str, amount: u64) -> Result<Option<u64>> {
        self.pick().incr(key, amount).await
    }

    /// Decrements a counter on one endpoint.
    pub async fn decr(&mut self, key: &str, amount: u64) -> Result<Option<u64>> {
        self.pick().decr(key, amount).await
    }

    /// Updates a key's expiration on one endpoint.
    pub async fn touch(&mut self, key: &str, exptime: i64) -> Result<bool> {
        self.pick().touch(key, exptime).await
    }

    /// Statistics from one endpoint.
    pub async fn stats(&mut self) -> Result<Vec<(String, String)>> {
        self.pick().stats().await
    }

    /// Flushes one endpoint.
    pub async fn flush(&mut self) -> Result<()> {
        self.pick().flush().await
    }

    /// Version string from one endpoint.
    pub async fn version(&mut self) -> Result<String> {
        self.pick().version().await
    }

    /// Closes every connection in parallel; resolves once all are closed.
    pub async fn end(self) -> Result<()> {
        let closing: Vec<_> = self
            .servers
            .into_iter()
            .map(|server| tokio::spawn(server.connection.close()))
            .collect();
        for task in closing {
            task.await.map_err(|join_error| {
                Error::Io(std::io::Error::new(std::io::ErrorKind::Other, join_error))
            })??;
        }
        Ok(())
    }
}

/// Walks `weights` subtracting from `draw` until it lands. The draw is in
/// `[0, Σweights)`, so the walk always terminates inside the slice; the
/// final index is a guard against float rounding at the top edge.
fn weighted_index(weights: &[f64], mut draw: f64) -> usize {
    for (index, weight) in weights.iter().enumerate() {
        draw -= weight;
        if draw <= 0.0 {
            return index;
        }
    }
    weights.len() - 1
}
