//! Built-in object type catalog.
//!
//! Types whose full field list is large (BIOS tokens, LDAP, port policies)
//! are declared open: their well-known fields are checked and everything
//! else passes through untouched.

use super::registry::{FieldDef, ObjectSchema, Role, Scope, SchemaRegistry, NAME_PATTERN};

pub const ORGANIZATION_TYPE: &str = "organization.Organization";

const ASSIGNMENT_ORDER: &[&str] = &["default", "sequential"];
const TARGET_PLATFORM: &[&str] = &["Standalone", "FIAttached"];
const ENABLED_DISABLED: &[&str] = &["Enabled", "Disabled"];
const PLATFORM_TOKEN: &[&str] = &["platform-default", "enabled", "disabled"];

/// Policy reference fields shared by server profiles and their templates.
const SERVER_POLICY_REFS: &[(&str, &str)] = &[
    ("AccessPolicy", "access.Policy"),
    ("AdapterConfigPolicy", "adapter.ConfigPolicy"),
    ("BiosPolicy", "bios.Policy"),
    ("BootPrecisionPolicy", "boot.PrecisionPolicy"),
    ("CertificateManagementPolicy", "certificatemanagement.Policy"),
    ("DeviceConnectorPolicy", "deviceconnector.Policy"),
    ("FirmwarePolicy", "firmware.Policy"),
    ("IpmiOverLanPolicy", "ipmioverlan.Policy"),
    ("KvmPolicy", "kvm.Policy"),
    ("LanConnectivityPolicy", "vnic.LanConnectivityPolicy"),
    ("LocalUserPolicy", "iam.EndPointUserPolicy"),
    ("LdapPolicy", "iam.LdapPolicy"),
    ("MemoryPolicy", "memory.Policy"),
    ("NetworkConnectivityPolicy", "networkconfig.Policy"),
    ("NtpPolicy", "ntp.Policy"),
    ("PersistentMemoryPolicy", "memory.PersistentMemoryPolicy"),
    ("PowerPolicy", "power.Policy"),
    ("SanConnectivityPolicy", "vnic.SanConnectivityPolicy"),
    ("ScrubPolicy", "compute.ScrubPolicy"),
    ("SdCardPolicy", "sdcard.Policy"),
    ("SmtpPolicy", "smtp.Policy"),
    ("SnmpPolicy", "snmp.Policy"),
    ("SolPolicy", "sol.Policy"),
    ("SshPolicy", "ssh.Policy"),
    ("StoragePolicy", "storage.StoragePolicy"),
    ("SyslogPolicy", "syslog.Policy"),
    ("ThermalPolicy", "thermal.Policy"),
    ("VmediaPolicy", "vmedia.Policy"),
];

struct SchemaBuilder(ObjectSchema);

impl SchemaBuilder {
    fn new(
        object_type: &str,
        display_name: &str,
        folder: Option<String>,
        short_key: Option<String>,
        scope: Scope,
        role: Role,
    ) -> Self {
        let mut fields = vec![
            FieldDef::string("Name")
                .required()
                .pattern(NAME_PATTERN.clone()),
            FieldDef::string("Description").length(None, Some(1024)),
            FieldDef::array("Tags"),
        ];
        if scope == Scope::Organization {
            fields.push(FieldDef::reference("Organization", ORGANIZATION_TYPE).required());
        }
        Self(ObjectSchema {
            object_type: object_type.to_string(),
            display_name: display_name.to_string(),
            folder,
            short_key,
            scope,
            role,
            open: false,
            fields,
            extra_dependencies: Vec::new(),
        })
    }

    fn field(mut self, def: FieldDef) -> Self {
        self.0.fields.push(def);
        self
    }

    fn string(self, name: &str) -> Self {
        self.field(FieldDef::string(name))
    }

    fn boolean(self, name: &str) -> Self {
        self.field(FieldDef::boolean(name))
    }

    fn array(self, name: &str) -> Self {
        self.field(FieldDef::array(name))
    }

    fn object(self, name: &str) -> Self {
        self.field(FieldDef::object(name))
    }

    fn integer(self, name: &str, min: i64, max: i64) -> Self {
        self.field(FieldDef::integer(name).range(Some(min), Some(max)))
    }

    fn one_of(self, name: &str, values: &[&str]) -> Self {
        self.field(FieldDef::string(name).one_of(values))
    }

    fn reference(self, name: &str, target: &str) -> Self {
        self.field(FieldDef::reference(name, target))
    }

    fn references(self, name: &str, target: &str) -> Self {
        self.field(FieldDef::references(name, target))
    }

    fn read_only(self, name: &str) -> Self {
        self.field(FieldDef::object(name).read_only())
    }

    fn server_policies(mut self) -> Self {
        for (field, target) in SERVER_POLICY_REFS {
            self = self.reference(field, target);
        }
        self
    }

    fn open(mut self) -> Self {
        self.0.open = true;
        self
    }

    fn build(self) -> ObjectSchema {
        self.0
    }
}

fn managed(
    object_type: &str,
    display_name: &str,
    folder: String,
    short_key: String,
) -> SchemaBuilder {
    SchemaBuilder::new(
        object_type,
        display_name,
        Some(folder),
        Some(short_key),
        Scope::Organization,
        Role::Managed,
    )
}

fn policy(object_type: &str, display_name: &str, key: &str) -> SchemaBuilder {
    managed(object_type, display_name, format!("policies/{}", key), key.to_string())
}

fn pool(object_type: &str, display_name: &str, key: &str) -> SchemaBuilder {
    managed(object_type, display_name, format!("pools/{}", key), key.to_string())
}

fn profile(object_type: &str, display_name: &str, key: &str) -> SchemaBuilder {
    managed(object_type, display_name, format!("profiles/{}", key), key.to_string())
}

fn template(object_type: &str, display_name: &str, key: &str) -> SchemaBuilder {
    managed(
        object_type,
        display_name,
        format!("templates/{}", key),
        format!("{}_template", key),
    )
}

fn reference_only(object_type: &str, display_name: &str) -> SchemaBuilder {
    SchemaBuilder::new(
        object_type,
        display_name,
        None,
        None,
        Scope::Global,
        Role::ReferenceOnly,
    )
    .open()
}

fn organization() -> SchemaBuilder {
    SchemaBuilder::new(
        ORGANIZATION_TYPE,
        "Organization",
        Some("organizations".to_string()),
        Some("organization".to_string()),
        Scope::Global,
        Role::Managed,
    )
    .array("ResourceGroups")
}

fn catalog() -> Vec<ObjectSchema> {
    vec![
        organization().build(),
        // Inventory targets referenced by profiles.
        reference_only("compute.Blade", "Blade Server").build(),
        reference_only("compute.RackUnit", "Rack Server").build(),
        reference_only("equipment.Chassis", "Chassis").build(),
        // Pools
        pool("fcpool.Pool", "Fibre Channel Pool", "fc")
            .one_of("PoolPurpose", &["WWNN", "WWPN"])
            .one_of("AssignmentOrder", ASSIGNMENT_ORDER)
            .array("IdBlocks")
            .build(),
        pool("ippool.Pool", "IP Pool", "ip")
            .one_of("AssignmentOrder", ASSIGNMENT_ORDER)
            .array("IpV4Blocks")
            .object("IpV4Config")
            .array("IpV6Blocks")
            .object("IpV6Config")
            .boolean("EnableBlockLevelSubnetConfig")
            .build(),
        pool("iqnpool.Pool", "IQN Pool", "iqn")
            .one_of("AssignmentOrder", ASSIGNMENT_ORDER)
            .string("Prefix")
            .array("IqnSuffixBlocks")
            .build(),
        pool("macpool.Pool", "MAC Pool", "mac")
            .one_of("AssignmentOrder", ASSIGNMENT_ORDER)
            .array("MacBlocks")
            .build(),
        pool("uuidpool.Pool", "UUID Pool", "uuid")
            .one_of("AssignmentOrder", ASSIGNMENT_ORDER)
            .string("Prefix")
            .array("UuidSuffixBlocks")
            .build(),
        policy(
            "resourcepool.QualificationPolicy",
            "Server Pool Qualification Policy",
            "server_pool_qualification",
        )
        .array("Qualifiers")
        .build(),
        pool("resourcepool.Pool", "Resource Pool", "resource")
            .one_of("PoolType", &["Static", "Dynamic"])
            .one_of("ResourceType", &["Server"])
            .array("Selectors")
            .references("Qualifications", "resourcepool.QualificationPolicy")
            .open()
            .build(),
        // Server policies
        policy("access.Policy", "IMC Access Policy", "access")
            .integer("InbandVlan", 4, 4093)
            .reference("InbandIpPool", "ippool.Pool")
            .reference("OutOfBandIpPool", "ippool.Pool")
            .object("AddressType")
            .object("ConfigurationType")
            .build(),
        policy("adapter.ConfigPolicy", "Adapter Configuration Policy", "adapter_config")
            .array("Settings")
            .build(),
        policy("bios.Policy", "BIOS Policy", "bios")
            .one_of("CpuPerformance", &["platform-default", "custom", "enterprise", "high-throughput", "hpc"])
            .one_of("IntelHyperThreadingTech", PLATFORM_TOKEN)
            .one_of("IntelVirtualizationTechnology", PLATFORM_TOKEN)
            .one_of("CpuEnergyPerformance", &["platform-default", "balanced-energy", "balanced-performance", "balanced-power", "energy-efficient", "performance", "power"])
            .open()
            .build(),
        policy("boot.PrecisionPolicy", "Boot Order Policy", "boot")
            .one_of("ConfiguredBootMode", &["Legacy", "Uefi"])
            .boolean("EnforceUefiSecureBoot")
            .array("BootDevices")
            .build(),
        policy("certificatemanagement.Policy", "Certificate Management Policy", "certificate")
            .array("Certificates")
            .build(),
        policy("compute.ScrubPolicy", "Scrub Policy", "scrub")
            .array("ScrubTargets")
            .open()
            .build(),
        policy("deviceconnector.Policy", "Device Connector Policy", "device_connector")
            .boolean("LockoutEnabled")
            .build(),
        policy("firmware.Policy", "Firmware Policy", "firmware")
            .one_of("TargetPlatform", TARGET_PLATFORM)
            .array("ModelBundleCombo")
            .array("ExcludeComponentList")
            .open()
            .build(),
        policy("iam.EndPointUserPolicy", "Local User Policy", "local_user")
            .object("PasswordProperties")
            .open()
            .build(),
        policy("iam.LdapPolicy", "LDAP Policy", "ldap")
            .boolean("Enabled")
            .boolean("EnableDns")
            .object("BaseProperties")
            .object("DnsParameters")
            .one_of("UserSearchPrecedence", &["LocalUserDb", "LDAPUserDb"])
            .open()
            .build(),
        policy("ipmioverlan.Policy", "IPMI Over LAN Policy", "ipmi_over_lan")
            .boolean("Enabled")
            .one_of("Privilege", &["admin", "user", "read-only"])
            .build(),
        policy("kvm.Policy", "Virtual KVM Policy", "kvm")
            .boolean("Enabled")
            .integer("MaximumSessions", 1, 4)
            .integer("RemotePort", 1, 65535)
            .boolean("EnableVideoEncryption")
            .boolean("EnableLocalServerVideo")
            .boolean("TunneledKvmEnabled")
            .build(),
        policy("memory.Policy", "Memory Policy", "memory")
            .boolean("EnableDimmBlocklisting")
            .build(),
        policy("memory.PersistentMemoryPolicy", "Persistent Memory Policy", "persistent_memory")
            .one_of("ManagementMode", &["configured-from-intersight", "configured-from-operating-system"])
            .array("Goals")
            .array("LogicalNamespaces")
            .boolean("RetainNamespaces")
            .object("LocalSecurity")
            .build(),
        policy("networkconfig.Policy", "Network Connectivity Policy", "network_connectivity")
            .boolean("EnableDynamicDns")
            .boolean("EnableIpv4dnsFromDhcp")
            .string("PreferredIpv4dnsServer")
            .string("AlternateIpv4dnsServer")
            .boolean("EnableIpv6")
            .open()
            .build(),
        policy("ntp.Policy", "NTP Policy", "ntp")
            .boolean("Enabled")
            .field(FieldDef::array("NtpServers").length(None, Some(4)))
            .array("AuthenticatedNtpServers")
            .string("Timezone")
            .build(),
        policy("power.Policy", "Power Policy", "power")
            .one_of("PowerRestoreState", &["AlwaysOff", "AlwaysOn", "LastState"])
            .one_of("RedundancyMode", &["Grid", "NotRedundant", "N+1", "N+2"])
            .one_of("PowerProfiling", ENABLED_DISABLED)
            .one_of("DynamicRebalancing", ENABLED_DISABLED)
            .one_of("PowerSaveMode", ENABLED_DISABLED)
            .one_of("ExtendedPowerCapacity", ENABLED_DISABLED)
            .integer("AllocatedBudget", 0, 65535)
            .open()
            .build(),
        policy("sdcard.Policy", "SD Card Policy", "sdcard")
            .array("Partitions")
            .build(),
        policy("smtp.Policy", "SMTP Policy", "smtp")
            .boolean("Enabled")
            .string("SmtpServer")
            .integer("SmtpPort", 1, 65535)
            .one_of("MinSeverity", &["critical", "major", "minor", "warning", "condition"])
            .string("SenderEmail")
            .array("SmtpRecipients")
            .build(),
        policy("snmp.Policy", "SNMP Policy", "snmp")
            .boolean("Enabled")
            .integer("SnmpPort", 1, 65535)
            .string("SysContact")
            .string("SysLocation")
            .array("SnmpUsers")
            .array("SnmpTraps")
            .open()
            .build(),
        policy("sol.Policy", "Serial Over LAN Policy", "serial_over_lan")
            .boolean("Enabled")
            .integer("BaudRate", 9600, 115200)
            .one_of("ComPort", &["com0", "com1"])
            .integer("SshPort", 1024, 65535)
            .build(),
        policy("ssh.Policy", "SSH Policy", "ssh")
            .boolean("Enabled")
            .integer("Port", 1, 65535)
            .integer("Timeout", 60, 10800)
            .build(),
        policy("storage.DriveSecurityPolicy", "Drive Security Policy", "drive_security")
            .object("KeySetting")
            .build(),
        policy("storage.StoragePolicy", "Storage Policy", "storage")
            .boolean("UseJbodForVdCreation")
            .one_of("UnusedDisksState", &["NoChange", "UnconfiguredGood", "Jbod"])
            .one_of("DefaultDriveMode", &["UnconfiguredGood", "Jbod", "RAID0"])
            .string("GlobalHotSpares")
            .object("M2VirtualDrive")
            .object("Raid0Drive")
            .open()
            .build(),
        policy("syslog.Policy", "Syslog Policy", "syslog")
            .array("LocalClients")
            .field(FieldDef::array("RemoteClients").length(None, Some(2)))
            .build(),
        policy("thermal.Policy", "Thermal Policy", "thermal")
            .one_of("FanControlMode", &["Balanced", "LowPower", "HighPower", "MaximumPower", "Acoustic"])
            .build(),
        policy("vmedia.Policy", "Virtual Media Policy", "virtual_media")
            .boolean("Enabled")
            .boolean("Encryption")
            .boolean("LowPowerUsb")
            .array("Mappings")
            .build(),
        // Fabric policies
        policy("fabric.EthNetworkControlPolicy", "Ethernet Network Control Policy", "ethernet_network_control")
            .boolean("CdpEnabled")
            .one_of("ForgeMac", &["allow", "deny"])
            .one_of("MacRegistrationMode", &["nativeVlanOnly", "allVlans"])
            .one_of("UplinkFailAction", &["linkDown", "warning"])
            .object("LldpSettings")
            .build(),
        policy("fabric.EthNetworkGroupPolicy", "Ethernet Network Group Policy", "ethernet_network_group")
            .object("VlanSettings")
            .build(),
        policy("fabric.EthNetworkPolicy", "VLAN Policy", "vlan")
            .open()
            .build(),
        policy("fabric.FcNetworkPolicy", "VSAN Policy", "vsan")
            .boolean("EnableTrunking")
            .build(),
        policy("fabric.FcZonePolicy", "FC Zone Policy", "fc_zone")
            .one_of("FcTargetZoningType", &["SIST", "SIMT", "None"])
            .array("FcTargetMembers")
            .build(),
        policy("fabric.FlowControlPolicy", "Flow Control Policy", "flow_control")
            .one_of("PriorityFlowControlMode", &["auto", "on"])
            .one_of("ReceiveDirection", ENABLED_DISABLED)
            .one_of("SendDirection", ENABLED_DISABLED)
            .build(),
        policy("fabric.LinkAggregationPolicy", "Link Aggregation Policy", "link_aggregation")
            .one_of("LacpRate", &["normal", "fast"])
            .boolean("SuspendIndividual")
            .build(),
        policy("fabric.LinkControlPolicy", "Link Control Policy", "link_control")
            .object("UdldSettings")
            .build(),
        policy("fabric.MulticastPolicy", "Multicast Policy", "multicast")
            .string("QuerierIpAddress")
            .one_of("QuerierState", ENABLED_DISABLED)
            .one_of("SnoopingState", ENABLED_DISABLED)
            .build(),
        policy("fabric.PortPolicy", "Port Policy", "port")
            .string("DeviceModel")
            .open()
            .build(),
        policy("fabric.SwitchControlPolicy", "Switch Control Policy", "switch_control")
            .one_of("EthernetSwitchingMode", &["end-host", "switch"])
            .one_of("FcSwitchingMode", &["end-host", "switch"])
            .open()
            .build(),
        policy("fabric.SystemQosPolicy", "System QoS Policy", "system_qos")
            .array("Classes")
            .build(),
        // Adapter policies
        policy("vnic.EthAdapterPolicy", "Ethernet Adapter Policy", "ethernet_adapter")
            .open()
            .build(),
        policy("vnic.EthQosPolicy", "Ethernet QoS Policy", "ethernet_qos")
            .integer("Mtu", 1500, 9000)
            .integer("Cos", 0, 6)
            .one_of("Priority", &["Best Effort", "FC", "Platinum", "Gold", "Silver", "Bronze"])
            .integer("RateLimit", 0, 100000)
            .boolean("TrustHostCos")
            .integer("Burst", 1024, 1000000)
            .build(),
        policy("vnic.FcAdapterPolicy", "Fibre Channel Adapter Policy", "fibre_channel_adapter")
            .open()
            .build(),
        policy("vnic.FcNetworkPolicy", "Fibre Channel Network Policy", "fibre_channel_network")
            .object("VsanSettings")
            .build(),
        policy("vnic.FcQosPolicy", "Fibre Channel QoS Policy", "fibre_channel_qos")
            .integer("Cos", 0, 6)
            .integer("MaxDataFieldSize", 256, 2112)
            .integer("RateLimit", 0, 100000)
            .build(),
        policy("vnic.IscsiAdapterPolicy", "iSCSI Adapter Policy", "iscsi_adapter")
            .integer("ConnectionTimeOut", 0, 255)
            .integer("DhcpTimeout", 60, 300)
            .integer("LunBusyRetryCount", 0, 60)
            .build(),
        policy("vnic.IscsiStaticTargetPolicy", "iSCSI Static Target Policy", "iscsi_static_target")
            .string("TargetName")
            .string("IpAddress")
            .integer("Port", 1, 65535)
            .object("Lun")
            .build(),
        policy("vnic.IscsiBootPolicy", "iSCSI Boot Policy", "iscsi_boot")
            .one_of("TargetSourceType", &["Static", "Auto"])
            .one_of("InitiatorIpSource", &["Pool", "Static", "DHCP"])
            .reference("IscsiAdapterPolicy", "vnic.IscsiAdapterPolicy")
            .reference("PrimaryTargetPolicy", "vnic.IscsiStaticTargetPolicy")
            .reference("SecondaryTargetPolicy", "vnic.IscsiStaticTargetPolicy")
            .reference("InitiatorIpPool", "ippool.Pool")
            .object("InitiatorStaticIpV4Config")
            .build(),
        policy("vnic.LanConnectivityPolicy", "LAN Connectivity Policy", "lan_connectivity")
            .one_of("IqnAllocationType", &["None", "Pool", "Static"])
            .one_of("PlacementMode", &["auto", "custom"])
            .one_of("TargetPlatform", TARGET_PLATFORM)
            .boolean("AzureQosEnabled")
            .string("StaticIqnName")
            .reference("IqnPool", "iqnpool.Pool")
            .build(),
        policy("vnic.SanConnectivityPolicy", "SAN Connectivity Policy", "san_connectivity")
            .one_of("WwnnAddressType", &["POOL", "STATIC"])
            .one_of("PlacementMode", &["auto", "custom"])
            .one_of("TargetPlatform", TARGET_PLATFORM)
            .string("StaticWwnnAddress")
            .reference("WwnnPool", "fcpool.Pool")
            .build(),
        // Interface templates
        template("vnic.EthIf", "vNIC", "vnic")
            .integer("Order", 0, 255)
            .one_of("MacAddressType", &["POOL", "STATIC"])
            .object("Placement")
            .object("Cdn")
            .reference("LanConnectivityPolicy", "vnic.LanConnectivityPolicy")
            .reference("EthAdapterPolicy", "vnic.EthAdapterPolicy")
            .reference("EthQosPolicy", "vnic.EthQosPolicy")
            .reference("FabricEthNetworkControlPolicy", "fabric.EthNetworkControlPolicy")
            .references("FabricEthNetworkGroupPolicy", "fabric.EthNetworkGroupPolicy")
            .reference("IscsiBootPolicy", "vnic.IscsiBootPolicy")
            .reference("MacPool", "macpool.Pool")
            .open()
            .build(),
        template("vnic.FcIf", "vHBA", "vhba")
            .integer("Order", 0, 255)
            .one_of("Type", &["fc-initiator", "fc-nvme-initiator", "fc-nvme-target", "fc-target"])
            .one_of("WwpnAddressType", &["POOL", "STATIC"])
            .object("Placement")
            .reference("SanConnectivityPolicy", "vnic.SanConnectivityPolicy")
            .reference("FcAdapterPolicy", "vnic.FcAdapterPolicy")
            .reference("FcNetworkPolicy", "vnic.FcNetworkPolicy")
            .reference("FcQosPolicy", "vnic.FcQosPolicy")
            .references("FcZonePolicies", "fabric.FcZonePolicy")
            .reference("WwpnPool", "fcpool.Pool")
            .open()
            .build(),
        // Templates and profiles
        template("server.ProfileTemplate", "Server Profile Template", "server")
            .one_of("TargetPlatform", TARGET_PLATFORM)
            .reference("UuidPool", "uuidpool.Pool")
            .server_policies()
            .build(),
        template("chassis.ProfileTemplate", "Chassis Profile Template", "chassis")
            .reference("ImcAccessPolicy", "access.Policy")
            .reference("PowerPolicy", "power.Policy")
            .reference("SnmpPolicy", "snmp.Policy")
            .reference("ThermalPolicy", "thermal.Policy")
            .build(),
        template("fabric.SwitchProfileTemplate", "Domain Profile Template", "domain")
            .reference("PortPolicy", "fabric.PortPolicy")
            .reference("SwitchControlPolicy", "fabric.SwitchControlPolicy")
            .reference("SystemQosPolicy", "fabric.SystemQosPolicy")
            .reference("VlanPolicy", "fabric.EthNetworkPolicy")
            .reference("VsanPolicy", "fabric.FcNetworkPolicy")
            .build(),
        profile("server.Profile", "Server Profile", "server")
            .one_of("TargetPlatform", TARGET_PLATFORM)
            .one_of("ServerAssignmentMode", &["None", "Static", "Pool"])
            .reference("AssignedServer", "compute.Blade")
            .reference("ServerPool", "resourcepool.Pool")
            .reference("UuidPool", "uuidpool.Pool")
            .reference("SrcTemplate", "server.ProfileTemplate")
            .server_policies()
            .read_only("DeployStatus")
            .build(),
        profile("chassis.Profile", "Chassis Profile", "chassis")
            .reference("AssignedChassis", "equipment.Chassis")
            .reference("SrcTemplate", "chassis.ProfileTemplate")
            .reference("ImcAccessPolicy", "access.Policy")
            .reference("PowerPolicy", "power.Policy")
            .reference("SnmpPolicy", "snmp.Policy")
            .reference("ThermalPolicy", "thermal.Policy")
            .read_only("DeployStatus")
            .build(),
        profile("fabric.SwitchClusterProfile", "Domain Profile", "domain")
            .one_of("Type", &["instance"])
            .reference("SrcTemplate", "fabric.SwitchProfileTemplate")
            .build(),
        profile("fabric.SwitchProfile", "Switch Profile", "switch")
            .field(FieldDef::reference("SwitchClusterProfile", "fabric.SwitchClusterProfile").required())
            .reference("PortPolicy", "fabric.PortPolicy")
            .reference("NetworkConnectivityPolicy", "networkconfig.Policy")
            .reference("NtpPolicy", "ntp.Policy")
            .reference("SnmpPolicy", "snmp.Policy")
            .reference("SyslogPolicy", "syslog.Policy")
            .reference("SwitchControlPolicy", "fabric.SwitchControlPolicy")
            .reference("SystemQosPolicy", "fabric.SystemQosPolicy")
            .reference("VlanPolicy", "fabric.EthNetworkPolicy")
            .reference("VsanPolicy", "fabric.FcNetworkPolicy")
            .read_only("DeployStatus")
            .build(),
    ]
}

pub(crate) fn builtin() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    for schema in catalog() {
        if let Err(e) = registry.register(schema) {
            log::warn!("Skipping catalog entry: {}", e);
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_catalog_is_complete_and_acyclic() {
        let registry = SchemaRegistry::builtin();
        assert_eq!(registry.len(), catalog().len());
        assert!(registry.len() >= 60);
        let order = registry.type_order().unwrap();
        assert_eq!(order.len(), registry.len());
        let pos = |t: &str| order.iter().position(|o| *o == t).unwrap();
        assert!(pos(ORGANIZATION_TYPE) < pos("bios.Policy"));
        assert!(pos("bios.Policy") < pos("server.Profile"));
        assert!(pos("server.ProfileTemplate") < pos("server.Profile"));
    }

    #[test]
    fn test_every_reference_target_is_registered() {
        let registry = SchemaRegistry::builtin();
        for schema in registry.schemas() {
            for target in schema.dependency_types() {
                assert!(
                    registry.lookup(target).is_ok(),
                    "{} references unregistered {}",
                    schema.object_type,
                    target
                );
            }
        }
    }

    #[test]
    fn test_folders_and_short_keys_are_unique() {
        let registry = SchemaRegistry::builtin();
        let mut aliases = HashSet::new();
        for schema in registry.managed() {
            for alias in [schema.folder.clone().unwrap(), schema.short_key.clone().unwrap()] {
                assert!(aliases.insert(alias.clone()), "duplicate alias {}", alias);
            }
        }
        assert_eq!(registry.resolve_type_name("server"), Some("server.Profile"));
        assert_eq!(
            registry.resolve_type_name("server_template"),
            Some("server.ProfileTemplate")
        );
    }

    #[test]
    fn test_organization_is_global_and_policies_are_scoped() {
        let registry = SchemaRegistry::builtin();
        assert!(registry.lookup(ORGANIZATION_TYPE).unwrap().is_global());
        let bios = registry.lookup("bios.Policy").unwrap();
        assert!(!bios.is_global());
        assert_eq!(bios.folder.as_deref(), Some("policies/bios"));
        assert_eq!(bios.dependency_types(), vec![ORGANIZATION_TYPE]);
    }
}
