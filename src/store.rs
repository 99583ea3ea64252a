use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::model::{
    AccountRecord, AccountStatus, Expense, FoodOrder, Invoice, InvoiceStatus, Organization,
};
use crate::notify::NotifyConfig;

const STORE_DIR: &str = ".canteen";

const ACCOUNTS_FILE: &str = "accounts.json";
const ORGANIZATIONS_FILE: &str = "organizations.json";
const ORDERS_FILE: &str = "orders.json";
const INVOICES_FILE: &str = "invoices.json";
const EXPENSES_FILE: &str = "expenses.json";

// Remembered-session snapshot: one fixed key, read at startup, written on
// login, removed on logout.
const SESSION_FILE: &str = "session.json";

const CONFIG_FILE: &str = "config.json";
const STATE_FILE: &str = "state.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    pub version: u32,

    /// Origin used when rendering approval links (`{base_url}/approve/{token}`).
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub notify: Option<NotifyConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoreState {
    version: u32,

    /// Per-collection surrogate-id counters.
    #[serde(default)]
    next_ids: HashMap<String, i64>,
}

/// JSON-file-backed record store. One file per collection, pretty-printed,
/// written atomically (tmp + rename). Single-writer by assumption; callers
/// that need to serialize read-modify-write cycles wrap the store in a lock.
#[derive(Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn data_dir(root: &Path) -> PathBuf {
        root.join(STORE_DIR)
    }

    pub fn open(workspace_root: &Path) -> Result<Self> {
        let root = Self::data_dir(workspace_root);
        if !root.is_dir() {
            return Err(anyhow!(
                "No {} directory found at {} (run `canteen init`)",
                STORE_DIR,
                root.display()
            ));
        }
        Ok(Self { root })
    }

    /// Walk up from `start` looking for an existing data directory.
    pub fn discover(start: &Path) -> Result<Self> {
        for dir in start.ancestors() {
            let candidate = Self::data_dir(dir);
            if candidate.is_dir() {
                return Ok(Self { root: candidate });
            }
        }
        Err(anyhow!(
            "no {} directory found above {} (run `canteen init`)",
            STORE_DIR,
            start.display()
        ))
    }

    pub fn init(workspace_root: &Path, force: bool) -> Result<Self> {
        let root = Self::data_dir(workspace_root);
        if root.exists() && !force {
            return Err(anyhow!(
                "{} already exists at {} (use --force to re-init)",
                STORE_DIR,
                root.display()
            ));
        }
        fs::create_dir_all(&root).context("create data dir")?;
        let store = Self { root };
        store.write_config(&StoreConfig {
            version: 1,
            base_url: None,
            notify: None,
        })?;
        store.write_state(&StoreState {
            version: 1,
            next_ids: HashMap::new(),
        })?;
        Ok(store)
    }

    /// Open `dir` itself as the data directory, creating default files on
    /// first use. The server uses this with its `--data-dir` argument.
    pub fn at(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("create data dir {}", dir.display()))?;
        let store = Self {
            root: dir.to_path_buf(),
        };
        if !store.root.join(CONFIG_FILE).exists() {
            store.write_config(&StoreConfig {
                version: 1,
                base_url: None,
                notify: None,
            })?;
        }
        Ok(store)
    }

    pub fn read_config(&self) -> Result<StoreConfig> {
        let path = self.root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(StoreConfig {
                version: 1,
                base_url: None,
                notify: None,
            });
        }
        let bytes = fs::read(&path).context("read config.json")?;
        let cfg: StoreConfig = serde_json::from_slice(&bytes).context("parse config.json")?;
        if cfg.version != 1 {
            anyhow::bail!("unsupported store config version {}", cfg.version);
        }
        Ok(cfg)
    }

    pub fn write_config(&self, cfg: &StoreConfig) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(cfg).context("serialize config")?;
        write_atomic(&self.root.join(CONFIG_FILE), &bytes).context("write config.json")?;
        Ok(())
    }

    fn read_state(&self) -> Result<StoreState> {
        let path = self.root.join(STATE_FILE);
        if !path.exists() {
            return Ok(StoreState {
                version: 1,
                next_ids: HashMap::new(),
            });
        }
        let bytes = fs::read(&path).context("read state.json")?;
        let st: StoreState = serde_json::from_slice(&bytes).context("parse state.json")?;
        Ok(st)
    }

    fn write_state(&self, st: &StoreState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(st).context("serialize state")?;
        write_atomic(&self.root.join(STATE_FILE), &bytes).context("write state.json")?;
        Ok(())
    }

    fn next_id(&self, collection: &str) -> Result<i64> {
        let mut st = self.read_state()?;
        if st.version != 1 {
            anyhow::bail!("unsupported store state version {}", st.version);
        }
        let counter = st.next_ids.entry(collection.to_string()).or_insert(1);
        let id = *counter;
        *counter += 1;
        self.write_state(&st)?;
        Ok(id)
    }

    fn read_records<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.root.join(file);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&path).with_context(|| format!("read {}", file))?;
        let records: Vec<T> =
            serde_json::from_slice(&bytes).with_context(|| format!("parse {}", file))?;
        Ok(records)
    }

    fn write_records<T: Serialize>(&self, file: &str, records: &[T]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(records)
            .with_context(|| format!("serialize {}", file))?;
        write_atomic(&self.root.join(file), &bytes).with_context(|| format!("write {}", file))?;
        Ok(())
    }

    // Accounts.

    pub fn insert_account(&self, email: &str, secret: &str, name: &str) -> Result<AccountRecord> {
        let mut accounts: Vec<AccountRecord> = self.read_records(ACCOUNTS_FILE)?;
        if accounts.iter().any(|a| a.email == email) {
            return Err(anyhow!("account already exists for {}", email));
        }
        let record = AccountRecord {
            id: self.next_id("accounts")?,
            email: email.to_string(),
            secret: secret.to_string(),
            name: name.to_string(),
            status: AccountStatus::Pending,
            created_at: now_ts(),
        };
        accounts.push(record.clone());
        self.write_records(ACCOUNTS_FILE, &accounts)?;
        Ok(record)
    }

    pub fn find_account_by_email(&self, email: &str) -> Result<Option<AccountRecord>> {
        let accounts: Vec<AccountRecord> = self.read_records(ACCOUNTS_FILE)?;
        Ok(accounts.into_iter().find(|a| a.email == email))
    }

    pub fn list_accounts_by_status(&self, status: AccountStatus) -> Result<Vec<AccountRecord>> {
        let accounts: Vec<AccountRecord> = self.read_records(ACCOUNTS_FILE)?;
        Ok(accounts.into_iter().filter(|a| a.status == status).collect())
    }

    pub fn update_account_status(
        &self,
        id: i64,
        status: AccountStatus,
    ) -> Result<AccountRecord> {
        // Terminal states may be overwritten by a replayed token, but a
        // record never returns to pending once it has left it.
        if status == AccountStatus::Pending {
            return Err(anyhow!("account status cannot return to pending"));
        }
        let mut accounts: Vec<AccountRecord> = self.read_records(ACCOUNTS_FILE)?;
        let Some(record) = accounts.iter_mut().find(|a| a.id == id) else {
            return Err(anyhow!("no account with id {}", id));
        };
        record.status = status;
        let updated = record.clone();
        self.write_records(ACCOUNTS_FILE, &accounts)?;
        Ok(updated)
    }

    // Remembered session.

    pub fn read_session(&self) -> Result<Option<AccountRecord>> {
        let path = self.root.join(SESSION_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).context("read session.json")?;
        let record: AccountRecord =
            serde_json::from_slice(&bytes).context("parse session.json")?;
        Ok(Some(record))
    }

    pub fn write_session(&self, account: &AccountRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(account).context("serialize session")?;
        write_atomic(&self.root.join(SESSION_FILE), &bytes).context("write session.json")?;
        Ok(())
    }

    pub fn clear_session(&self) -> Result<()> {
        let path = self.root.join(SESSION_FILE);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("remove {}", path.display()))?;
        }
        Ok(())
    }

    // Organizations.

    pub fn add_organization(
        &self,
        account_id: i64,
        name: &str,
        contact_person: &str,
        email: &str,
    ) -> Result<Organization> {
        let mut records: Vec<Organization> = self.read_records(ORGANIZATIONS_FILE)?;
        let record = Organization {
            id: self.next_id("organizations")?,
            name: name.to_string(),
            contact_person: contact_person.to_string(),
            email: email.to_string(),
            created_at: now_ts(),
            account_id,
        };
        records.push(record.clone());
        self.write_records(ORGANIZATIONS_FILE, &records)?;
        Ok(record)
    }

    pub fn list_organizations(&self) -> Result<Vec<Organization>> {
        self.read_records(ORGANIZATIONS_FILE)
    }

    pub fn remove_organization(&self, id: i64) -> Result<()> {
        self.remove_record::<Organization>(ORGANIZATIONS_FILE, "organization", id, |r| r.id)
    }

    // Food orders.

    pub fn add_food_order(
        &self,
        account_id: i64,
        organization_id: i64,
        people_served: u32,
        food_items: Vec<String>,
        total_cost: f64,
        order_date: Option<String>,
    ) -> Result<FoodOrder> {
        let mut records: Vec<FoodOrder> = self.read_records(ORDERS_FILE)?;
        let record = FoodOrder {
            id: self.next_id("orders")?,
            organization_id,
            people_served,
            food_items,
            total_cost,
            order_date: order_date.unwrap_or_else(now_ts),
            account_id,
        };
        records.push(record.clone());
        self.write_records(ORDERS_FILE, &records)?;
        Ok(record)
    }

    pub fn list_food_orders(&self) -> Result<Vec<FoodOrder>> {
        self.read_records(ORDERS_FILE)
    }

    pub fn remove_food_order(&self, id: i64) -> Result<()> {
        self.remove_record::<FoodOrder>(ORDERS_FILE, "food order", id, |r| r.id)
    }

    // Invoices.

    pub fn add_invoice(
        &self,
        account_id: i64,
        organization_id: i64,
        order_id: i64,
        amount: f64,
        status: InvoiceStatus,
    ) -> Result<Invoice> {
        let mut records: Vec<Invoice> = self.read_records(INVOICES_FILE)?;
        let record = Invoice {
            id: self.next_id("invoices")?,
            organization_id,
            order_id,
            amount,
            status,
            created_at: now_ts(),
            account_id,
        };
        records.push(record.clone());
        self.write_records(INVOICES_FILE, &records)?;
        Ok(record)
    }

    pub fn list_invoices(&self) -> Result<Vec<Invoice>> {
        self.read_records(INVOICES_FILE)
    }

    pub fn remove_invoice(&self, id: i64) -> Result<()> {
        self.remove_record::<Invoice>(INVOICES_FILE, "invoice", id, |r| r.id)
    }

    // Expenses.

    pub fn add_expense(
        &self,
        account_id: i64,
        description: &str,
        amount: f64,
        category: &str,
        date: Option<String>,
    ) -> Result<Expense> {
        let mut records: Vec<Expense> = self.read_records(EXPENSES_FILE)?;
        let record = Expense {
            id: self.next_id("expenses")?,
            description: description.to_string(),
            amount,
            category: category.to_string(),
            date: date.unwrap_or_else(now_ts),
            account_id,
        };
        records.push(record.clone());
        self.write_records(EXPENSES_FILE, &records)?;
        Ok(record)
    }

    pub fn list_expenses(&self) -> Result<Vec<Expense>> {
        self.read_records(EXPENSES_FILE)
    }

    pub fn remove_expense(&self, id: i64) -> Result<()> {
        self.remove_record::<Expense>(EXPENSES_FILE, "expense", id, |r| r.id)
    }

    fn remove_record<T: DeserializeOwned + Serialize>(
        &self,
        file: &str,
        kind: &str,
        id: i64,
        record_id: impl Fn(&T) -> i64,
    ) -> Result<()> {
        let mut records: Vec<T> = self.read_records(file)?;
        let before = records.len();
        records.retain(|r| record_id(r) != id);
        if records.len() == before {
            return Err(anyhow!("no {} with id {}", kind, id));
        }
        self.write_records(file, &records)?;
        Ok(())
    }
}

pub fn now_ts() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "<time>".to_string())
}

pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create parent directories")?;
    }
    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    fs::write(&tmp, bytes).with_context(|| format!("write temp file {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
