//! nifcloud_db_instance
//!
//! Managed database server on the RDB API. Deletion skips the final
//! snapshot.

use async_trait::async_trait;
use nifcloud_core::provider::ProviderResult;
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_core::waiter::{Status, Waiter};
use nifcloud_sdk::{Api, Params, json};

use super::ResourceHandler;
use crate::utils::{
    Flattener, changed, expand_params, first_at, found, ignore_not_found, param_value, rdb,
    require_str, status_of, wait_until, waiter,
};

const POLL_SECS: u64 = 30;
const TIMEOUT_SECS: u64 = 60 * 60;
const RESULT_PATH: &str = "DescribeDBInstancesResult.DBInstances.DBInstance";

/// Attributes changed in place through ModifyDBInstance; the request
/// parameter is the attribute's provider name
const MODIFIABLE: &[&str] = &[
    "instance_class",
    "allocated_storage",
    "password",
    "parameter_group_name",
    "db_security_group_name",
    "backup_retention_period",
    "backup_window",
    "maintenance_window",
    "multi_az",
    "accounting_type",
];

pub struct DbInstance;

#[async_trait]
impl ResourceHandler for DbInstance {
    fn name(&self) -> &'static str {
        "db_instance"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("db_instance")
            .with_description("Managed MySQL, PostgreSQL or MariaDB server")
            .attribute(
                AttributeSchema::new("identifier", types::resource_name(63))
                    .required()
                    .force_new()
                    .with_provider_name("DBInstanceIdentifier"),
            )
            .attribute(
                AttributeSchema::new("instance_class", AttributeType::String)
                    .required()
                    .with_provider_name("DBInstanceClass"),
            )
            .attribute(
                AttributeSchema::new("engine", types::one_of(&["MySQL", "postgres", "MariaDB"]))
                    .required()
                    .force_new()
                    .with_provider_name("Engine"),
            )
            .attribute(
                AttributeSchema::new("engine_version", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .with_provider_name("EngineVersion"),
            )
            .attribute(
                AttributeSchema::new("allocated_storage", types::int_between("Storage", 50, 2000))
                    .required()
                    .with_provider_name("AllocatedStorage")
                    .with_description("Storage in GB"),
            )
            .attribute(
                AttributeSchema::new("storage_type", AttributeType::Int)
                    .optional_computed()
                    .force_new()
                    .with_provider_name("StorageType"),
            )
            .attribute(
                AttributeSchema::new("username", AttributeType::String)
                    .required()
                    .force_new()
                    .with_provider_name("MasterUsername"),
            )
            .attribute(
                AttributeSchema::new("password", types::string_length(8, 41))
                    .required()
                    .sensitive()
                    .with_provider_name("MasterUserPassword"),
            )
            .attribute(
                AttributeSchema::new("db_name", AttributeType::String)
                    .force_new()
                    .with_provider_name("DBName"),
            )
            .attribute(
                AttributeSchema::new("parameter_group_name", AttributeType::String)
                    .optional_computed()
                    .with_provider_name("DBParameterGroupName"),
            )
            .attribute(
                AttributeSchema::new("db_security_group_name", AttributeType::String)
                    .with_provider_name("DBSecurityGroups.member.1"),
            )
            .attribute(
                AttributeSchema::new("availability_zone", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .with_provider_name("AvailabilityZone"),
            )
            .attribute(
                AttributeSchema::new("backup_retention_period", types::int_between("Days", 0, 10))
                    .optional_computed()
                    .with_provider_name("BackupRetentionPeriod"),
            )
            .attribute(
                AttributeSchema::new("backup_window", AttributeType::String)
                    .optional_computed()
                    .with_provider_name("PreferredBackupWindow"),
            )
            .attribute(
                AttributeSchema::new("maintenance_window", AttributeType::String)
                    .optional_computed()
                    .with_provider_name("PreferredMaintenanceWindow"),
            )
            .attribute(
                AttributeSchema::new("multi_az", AttributeType::Bool)
                    .with_default(false)
                    .with_provider_name("MultiAZ"),
            )
            .attribute(
                AttributeSchema::new("port", types::port_number())
                    .optional_computed()
                    .force_new()
                    .with_provider_name("Port"),
            )
            .attribute(
                AttributeSchema::new("accounting_type", types::one_of(&["1", "2"]))
                    .with_default("2")
                    .with_provider_name("NiftyAccountingType"),
            )
            .attribute(
                AttributeSchema::new("apply_immediately", AttributeType::Bool)
                    .with_default(true)
                    .with_description("Apply modifications now instead of in the maintenance window"),
            )
            .attribute(AttributeSchema::new("address", AttributeType::String).computed())
            .attribute(AttributeSchema::new("status", AttributeType::String).computed())
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let identifier = require_str(resource, "identifier")?;
        let id = &resource.id;

        let mut params = Params::new();
        expand_params(&self.schema(), resource, &mut params);
        rdb(api, id, "CreateDBInstance", &params).await?;
        wait_for(api, id, identifier, &["available"]).await?;

        Ok(self.read(api, id, identifier).await?.with_identifier(identifier))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let Some(db) = describe(api, id, identifier).await? else {
            return Ok(State::not_found(id.clone()));
        };

        let attributes = Flattener::new()
            .field("identifier", &db, "DBInstanceIdentifier")
            .field("instance_class", &db, "DBInstanceClass")
            .field("engine", &db, "Engine")
            .field("engine_version", &db, "EngineVersion")
            .int_field("allocated_storage", &db, "AllocatedStorage")
            .int_field("storage_type", &db, "StorageType")
            .field("username", &db, "MasterUsername")
            .field("db_name", &db, "DBName")
            .str(
                "parameter_group_name",
                first_at(&db, "DBParameterGroups.DBParameterGroup")
                    .and_then(|g| json::str_at(g, "DBParameterGroupName")),
            )
            .str(
                "db_security_group_name",
                first_at(&db, "DBSecurityGroups.DBSecurityGroup")
                    .and_then(|g| json::str_at(g, "DBSecurityGroupName")),
            )
            .field("availability_zone", &db, "AvailabilityZone")
            .int_field("backup_retention_period", &db, "BackupRetentionPeriod")
            .field("backup_window", &db, "PreferredBackupWindow")
            .field("maintenance_window", &db, "PreferredMaintenanceWindow")
            .bool_field("multi_az", &db, "MultiAZ")
            .int_field("port", &db, "Endpoint.Port")
            .field("accounting_type", &db, "NextMonthAccountingType")
            .field("address", &db, "Endpoint.Address")
            .field("status", &db, "DBInstanceStatus")
            .build();
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    async fn update(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let schema = self.schema();
        let changes = changed(&schema, from, to);

        let mut params = Params::new();
        for attribute in MODIFIABLE.iter().filter(|a| changes.contains(*a)) {
            let param = schema
                .attributes
                .get(*attribute)
                .and_then(|a| a.provider_name.as_deref());
            // a removed attribute is cleared with an empty value
            let value = to.attr(attribute).and_then(param_value).unwrap_or_default();
            if let Some(param) = param {
                params.set(param, value);
            }
        }

        if !params.is_empty() {
            params
                .set("DBInstanceIdentifier", identifier)
                .set_bool("ApplyImmediately", to.get_bool("apply_immediately").unwrap_or(true));
            rdb(api, id, "ModifyDBInstance", &params).await?;
            wait_for(api, id, identifier, &["available"]).await?;
        }

        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let mut params = Params::new();
        params
            .set("DBInstanceIdentifier", identifier)
            .set_bool("SkipFinalSnapshot", true);
        ignore_not_found(rdb(api, id, "DeleteDBInstance", &params).await)?;
        wait_for(api, id, identifier, &[Waiter::GONE]).await
    }
}

async fn describe(
    api: &dyn Api,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<Option<serde_json::Value>> {
    let mut params = Params::new();
    params.set("DBInstanceIdentifier", identifier);
    let response = found(rdb(api, id, "DescribeDBInstances", &params).await)?;
    Ok(response.and_then(|r| first_at(&r, RESULT_PATH).cloned()))
}

async fn wait_for(
    api: &dyn Api,
    id: &ResourceId,
    identifier: &str,
    targets: &[&str],
) -> ProviderResult<()> {
    let waiter = waiter(id, POLL_SECS, TIMEOUT_SECS)
        .until(targets)
        .failing_on(&["failed", "incompatible-parameters", "incompatible-restore", "storage-full"]);
    wait_until(waiter, id, move || async move {
        let db = describe(api, id, identifier).await?;
        Ok::<Status, _>(status_of(db, "DBInstanceStatus"))
    })
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use nifcloud_core::resource::Value;
    use nifcloud_sdk::Service;
    use serde_json::json;

    fn described(status: &str, class: &str) -> serde_json::Value {
        json!({
            "DescribeDBInstancesResult": {
                "DBInstances": {
                    "DBInstance": {
                        "DBInstanceIdentifier": "appdb",
                        "DBInstanceClass": class,
                        "Engine": "MySQL",
                        "EngineVersion": "8.0",
                        "AllocatedStorage": "50",
                        "MasterUsername": "admin",
                        "DBInstanceStatus": status,
                        "MultiAZ": "false",
                        "Endpoint": {"Address": "appdb.rdb.example.jp", "Port": "3306"},
                        "DBParameterGroups": {
                            "DBParameterGroup": {"DBParameterGroupName": "default.mysql8.0"}
                        }
                    }
                }
            }
        })
    }

    fn id() -> ResourceId {
        ResourceId::new("db_instance", "appdb")
    }

    #[tokio::test(start_paused = true)]
    async fn create_calls_rdb_and_waits() {
        let api = FakeApi::new();
        api.reply("DescribeDBInstances", described("creating", "db.large8"))
            .reply("DescribeDBInstances", described("available", "db.large8"));

        let resource = Resource::new("db_instance", "appdb")
            .with_attribute("identifier", "appdb")
            .with_attribute("instance_class", "db.large8")
            .with_attribute("engine", "MySQL")
            .with_attribute("allocated_storage", 50)
            .with_attribute("username", "admin")
            .with_attribute("password", "s3cretpass")
            .with_attribute("multi_az", false);
        let state = DbInstance.create(&api, &resource).await.unwrap();

        let create = api.call("CreateDBInstance").unwrap();
        assert_eq!(create.service, Service::Rdb);
        assert_eq!(create.param("DBInstanceIdentifier"), Some("appdb"));
        assert_eq!(create.param("MasterUserPassword"), Some("s3cretpass"));
        assert_eq!(create.param("MultiAZ"), Some("false"));

        assert_eq!(state.get_str("address"), Some("appdb.rdb.example.jp"));
        assert_eq!(state.get_int("port"), Some(3306));
        assert_eq!(state.get_str("parameter_group_name"), Some("default.mysql8.0"));
        assert_eq!(state.get_bool("multi_az"), Some(false));
        assert_eq!(state.attr("password"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn class_change_modifies_immediately() {
        let api = FakeApi::new();
        api.reply("DescribeDBInstances", described("modifying", "db.large8"))
            .reply("DescribeDBInstances", described("available", "db.xlarge16"));

        let from = State::existing(
            id(),
            [("instance_class".to_string(), Value::from("db.large8"))]
                .into_iter()
                .collect(),
        );
        let to = Resource::new("db_instance", "appdb")
            .with_attribute("instance_class", "db.xlarge16")
            .with_attribute("apply_immediately", true);
        let state = DbInstance.update(&api, &id(), "appdb", &from, &to).await.unwrap();

        let modify = api.call("ModifyDBInstance").unwrap();
        assert_eq!(modify.param("DBInstanceClass"), Some("db.xlarge16"));
        assert_eq!(modify.param("ApplyImmediately"), Some("true"));
        assert_eq!(state.get_str("instance_class"), Some("db.xlarge16"));
    }

    #[tokio::test(start_paused = true)]
    async fn removed_security_group_is_cleared() {
        let api = FakeApi::new();
        api.reply("DescribeDBInstances", described("available", "db.large8"));

        let from = State::existing(
            id(),
            [
                ("instance_class".to_string(), Value::from("db.large8")),
                ("db_security_group_name".to_string(), Value::from("dbfw")),
            ]
            .into_iter()
            .collect(),
        );
        let to = Resource::new("db_instance", "appdb").with_attribute("instance_class", "db.large8");
        DbInstance.update(&api, &id(), "appdb", &from, &to).await.unwrap();

        assert_eq!(api.mutations(), vec!["ModifyDBInstance"]);
        let modify = api.call("ModifyDBInstance").unwrap();
        assert_eq!(modify.param("DBSecurityGroups.member.1"), Some(""));
        assert_eq!(modify.param("DBInstanceClass"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_stops_the_wait() {
        let api = FakeApi::new();
        api.reply("DescribeDBInstances", described("failed", "db.large8"));

        let resource = Resource::new("db_instance", "appdb").with_attribute("identifier", "appdb");
        let err = DbInstance.create(&api, &resource).await.unwrap_err();
        assert!(err.to_string().contains("failure status 'failed'"));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_skips_final_snapshot() {
        let api = FakeApi::new();
        api.reply("DescribeDBInstances", described("deleting", "db.large8"))
            .fail("DescribeDBInstances", 404, "Client.InvalidParameterNotFound.DBInstance");

        DbInstance.delete(&api, &id(), "appdb").await.unwrap();
        assert_eq!(
            api.call("DeleteDBInstance").unwrap().param("SkipFinalSnapshot"),
            Some("true")
        );
    }
}
