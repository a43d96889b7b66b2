/// Connection Management Module
///
/// This module provides the connection handle: opening and closing a driver
/// session, character-set selection, and the two statement-execution tiers
/// (best-effort and must-succeed).

use crate::core::db::driver::{Driver, NativeResult};
use crate::core::db::sqlite::SqliteDriver;
use crate::core::db::template::{Arg, QueryTemplate};
use crate::core::{DbError, Result};
use tracing::{debug, info, warn};

/// Host and port parsed from a `host[:port]` connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    /// 0 selects the driver default
    pub port: u16,
}

impl ConnectionTarget {
    /// Parses `host` or `host:port`.
    ///
    /// # Examples
    ///
    /// ```
    /// use unidb::ConnectionTarget;
    /// let target = ConnectionTarget::parse("db.example.com:3307").unwrap();
    /// assert_eq!(target.host, "db.example.com");
    /// assert_eq!(target.port, 3307);
    /// ```
    pub fn parse(descriptor: &str) -> Result<Self> {
        match descriptor.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| DbError::Descriptor(format!("invalid port in {:?}", descriptor)))?;
                Ok(ConnectionTarget {
                    host: host.to_string(),
                    port,
                })
            }
            None => Ok(ConnectionTarget {
                host: descriptor.to_string(),
                port: 0,
            }),
        }
    }
}

/// One open driver session.
///
/// Not shared between threads; every operation takes `&mut self`. After
/// [`Connection::close`] must-succeed operations fail with
/// `DbError::NotConnected` and best-effort operations report failure.
#[derive(Debug)]
pub struct Connection<D: Driver = SqliteDriver> {
    driver: Option<D>,
}

impl Connection<SqliteDriver> {
    /// Opens a session with the embedded SQLite driver. `database` is the
    /// database file path, or `:memory:`.
    ///
    /// # Examples
    ///
    /// ```
    /// use unidb::Connection;
    /// let mut conn = Connection::open("localhost", "", "", ":memory:").unwrap();
    /// assert!(conn.is_open());
    /// conn.close();
    /// ```
    pub fn open(connection: &str, user: &str, password: &str, database: &str) -> Result<Self> {
        Connection::open_with(SqliteDriver::new(), connection, user, password, database)
    }
}

impl<D: Driver> Connection<D> {
    /// Opens a session through any driver.
    ///
    /// # Errors
    ///
    /// `DbError::Descriptor` for a malformed port, `DbError::Database` with
    /// the driver's text when the driver refuses the connection.
    pub fn open_with(mut driver: D, connection: &str, user: &str, password: &str, database: &str) -> Result<Self> {
        let target = ConnectionTarget::parse(connection)?;

        if !driver.real_connect(&target.host, user, password, database, target.port) {
            let message = driver.error();
            driver.close();
            return Err(DbError::Database(message));
        }

        info!("Connected to {} (port {}) database {:?}", target.host, target.port, database);
        Ok(Connection { driver: Some(driver) })
    }

    /// Releases the driver session. Calling it again is a no-op.
    pub fn close(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            driver.close();
            info!("Connection closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.driver.is_some()
    }

    /// Applies a character set to the session.
    pub fn set_encoding(&mut self, name: &str) -> bool {
        match self.driver.as_mut() {
            Some(driver) => {
                let ok = driver.set_character_set(name);
                if !ok {
                    warn!("Failed to set encoding {}: {}", name, driver.error());
                }
                ok
            }
            None => false,
        }
    }

    /// Runs a statement, reporting failure as `false`.
    pub fn try_exec(&mut self, template: impl Into<QueryTemplate>, args: &[Arg]) -> bool {
        match self.exec(template, args) {
            Ok(()) => true,
            Err(e) => {
                warn!("Statement failed: {}", e);
                false
            }
        }
    }

    /// Runs a statement and discards any rows it returns.
    ///
    /// # Errors
    ///
    /// `DbError::Database` with the driver's error text.
    pub fn exec(&mut self, template: impl Into<QueryTemplate>, args: &[Arg]) -> Result<()> {
        let driver = self.send(&template.into(), args)?;
        if let Some(mut result) = driver.use_result() {
            while result.fetch_row().is_some() {}
            driver.free_result(result);
        }
        Ok(())
    }

    /// Formats and sends a statement, leaving any result set pending on the
    /// driver for the caller to claim.
    pub(crate) fn send(&mut self, template: &QueryTemplate, args: &[Arg]) -> Result<&mut D> {
        let sql = template.format(args);
        let driver = self.driver_mut()?;
        debug!("Executing: {}", sql);
        if driver.real_query(&sql) {
            Ok(driver)
        } else {
            Err(DbError::Database(driver.error()))
        }
    }

    pub(crate) fn driver_mut(&mut self) -> Result<&mut D> {
        self.driver.as_mut().ok_or(DbError::NotConnected)
    }

    /// Borrows the underlying driver.
    pub fn driver(&self) -> Option<&D> {
        self.driver.as_ref()
    }
}

impl<D: Driver> Drop for Connection<D> {
    fn drop(&mut self) {
        self.close();
    }
}
