//! Warehouse and script catalog operations.
//!
//! Scripts are what jobs point at, so these live on the [`Scheduler`]: a
//! script's locator is checked against the unit registry, and scripts or
//! warehouses that still have jobs cannot be deleted.

use tracing::info;

use crate::engine::Scheduler;
use crate::error::{Result, SchedulerError};
use crate::types::{NewScript, NewWarehouse, Script, ScriptUpdate, Warehouse, WarehouseUpdate};

fn required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SchedulerError::Validation(format!("{field} is required")));
    }
    Ok(())
}

impl Scheduler {
    pub fn create_warehouse(&self, new: &NewWarehouse) -> Result<Warehouse> {
        required("name", &new.name)?;
        if self.store().warehouse_name_taken(&new.name, None)? {
            return Err(SchedulerError::Validation(format!(
                "warehouse '{}' already exists",
                new.name
            )));
        }
        let warehouse = self.store().create_warehouse(new)?;
        info!(warehouse_id = warehouse.id, name = %warehouse.name, "warehouse created");
        Ok(warehouse)
    }

    pub fn list_warehouses(&self) -> Result<Vec<Warehouse>> {
        self.store().list_warehouses()
    }

    pub fn get_warehouse(&self, id: i64) -> Result<Warehouse> {
        self.store().get_warehouse(id)
    }

    pub fn update_warehouse(&self, id: i64, update: &WarehouseUpdate) -> Result<Warehouse> {
        if let Some(name) = &update.name {
            required("name", name)?;
            if self.store().warehouse_name_taken(name, Some(id))? {
                return Err(SchedulerError::Validation(format!(
                    "warehouse '{name}' already exists"
                )));
            }
        }
        self.store().update_warehouse(id, update)
    }

    /// Delete a warehouse together with its scripts.
    pub fn delete_warehouse(&self, id: i64) -> Result<()> {
        self.store().get_warehouse(id)?;
        let jobs = self.store().count_jobs_in_warehouse(id)?;
        if jobs > 0 {
            return Err(SchedulerError::Validation(format!(
                "warehouse {id} still has {jobs} scheduled job(s)"
            )));
        }
        self.store().delete_warehouse(id)?;
        info!(warehouse_id = id, "warehouse deleted");
        Ok(())
    }

    pub fn create_script(&self, warehouse_id: i64, new: &NewScript) -> Result<Script> {
        required("name", &new.name)?;
        self.validate_locator(&new.locator)?;
        let script = self.store().create_script(warehouse_id, new)?;
        info!(script_id = script.id, locator = %script.locator, "script created");
        Ok(script)
    }

    pub fn scripts_for(&self, warehouse_id: i64) -> Result<Vec<Script>> {
        self.store().scripts_for(warehouse_id)
    }

    pub fn get_script(&self, id: i64) -> Result<Script> {
        self.store().get_script(id)
    }

    pub fn update_script(&self, id: i64, update: &ScriptUpdate) -> Result<Script> {
        if let Some(name) = &update.name {
            required("name", name)?;
        }
        if let Some(locator) = &update.locator {
            self.validate_locator(locator)?;
        }
        self.store().update_script(id, update)
    }

    pub fn delete_script(&self, id: i64) -> Result<()> {
        self.store().get_script(id)?;
        if self.store().count_jobs_for_script(id)? > 0 {
            return Err(SchedulerError::Validation(format!(
                "script {id} is still scheduled; remove its job first"
            )));
        }
        self.store().delete_script(id)?;
        info!(script_id = id, "script deleted");
        Ok(())
    }
}
