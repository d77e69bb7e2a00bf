// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Schemas of the built-in object types.

use super::{SchemaRegistry, TableKind, TableSchemaBuilder};
use crate::errors::UpllResult;
use crate::key::ObjectType;
use crate::value::FieldKind;

const DESC_WIDTH: usize = 127;
const PORT_WIDTH: usize = 319;

/// Indices of configured attributes, per table.
pub mod attrs {
    pub mod vtn {
        pub const DESCRIPTION: usize = 0;
        pub const STATE_CREATION_TIME: usize = 0;
        pub const STATE_LAST_UPDATED_TIME: usize = 1;
    }
    pub mod vtn_ctrlr {
        pub const REF_COUNT: usize = 0;
    }
    pub mod vtn_rename {
        pub const CTRLR_VTN_NAME: usize = 0;
    }
    pub mod vbr {
        pub const DESCRIPTION: usize = 0;
        pub const HOST_ADDR: usize = 1;
        pub const HOST_ADDR_PREFIXLEN: usize = 2;
    }
    pub mod vnode_rename {
        pub const CTRLR_VTN_NAME: usize = 0;
        pub const CTRLR_VNODE_NAME: usize = 1;
    }
    pub mod vbr_convert {
        pub const CONV_VBR_NAME: usize = 0;
        pub const LABEL: usize = 1;
    }
    pub mod vbr_if {
        pub const DESCRIPTION: usize = 0;
        pub const ADMIN_STATUS: usize = 1;
        pub const LOGICAL_PORT_ID: usize = 2;
        pub const VLAN_ID: usize = 3;
    }
    pub mod vlan_map {
        pub const VLAN_ID: usize = 0;
    }
    pub mod vrt {
        pub const DESCRIPTION: usize = 0;
        pub const DHCP_RELAY_ADMIN_STATUS: usize = 1;
    }
    pub mod vrt_if {
        pub const DESCRIPTION: usize = 0;
        pub const IP_ADDR: usize = 1;
        pub const PREFIXLEN: usize = 2;
        pub const MAC_ADDR: usize = 3;
        pub const ADMIN_STATUS: usize = 4;
    }
    pub mod vterm {
        pub const DESCRIPTION: usize = 0;
    }
    pub mod vterm_if {
        pub const DESCRIPTION: usize = 0;
        pub const ADMIN_STATUS: usize = 1;
        pub const LOGICAL_PORT_ID: usize = 2;
        pub const VLAN_ID: usize = 3;
    }
    pub mod vtunnel {
        pub const DESCRIPTION: usize = 0;
        pub const UNDERLAY_VTN: usize = 1;
        pub const LABEL: usize = 2;
    }
    pub mod vtunnel_if {
        pub const DESCRIPTION: usize = 0;
        pub const ADMIN_STATUS: usize = 1;
    }
    pub mod flowlist {
        pub const IP_TYPE: usize = 0;
    }
    pub mod flowlist_rename {
        pub const CTRLR_FLOWLIST_NAME: usize = 0;
    }
    pub mod flowlist_entry {
        pub const MAC_DST: usize = 0;
        pub const DST_IP: usize = 1;
        pub const IP_PROTO: usize = 2;
        pub const VLAN_PRIORITY: usize = 3;
    }
    pub mod policingprofile_rename {
        pub const CTRLR_POLICINGPROFILE_NAME: usize = 0;
    }
    pub mod policingprofile_entry {
        pub const FLOWLIST: usize = 0;
        pub const RATE: usize = 1;
        pub const CIR: usize = 2;
        pub const CBS: usize = 3;
        pub const PIR: usize = 4;
        pub const PBS: usize = 5;
    }
    pub mod vtn_flowfilter_entry {
        pub const FLOWLIST_NAME: usize = 0;
        pub const ACTION: usize = 1;
        pub const NWM_NAME: usize = 2;
        pub const DSCP: usize = 3;
        pub const PRIORITY: usize = 4;
    }
    pub mod vtn_unified {
        pub const LABEL: usize = 0;
    }
}

fn vnode_rename(otype: ObjectType, vnode_key: &str) -> TableSchemaBuilder {
    TableSchemaBuilder::new(otype, TableKind::Rename)
        .name_key("vtn_name")
        .name_key(vnode_key)
        .value("ctrlr_vtn_name", FieldKind::Text, 31)
        .value("ctrlr_vnode_name", FieldKind::Text, 31)
        .controller_scoped()
}

fn vnode_if(otype: ObjectType, vnode_key: &str) -> TableSchemaBuilder {
    TableSchemaBuilder::new(otype, TableKind::Main)
        .name_key("vtn_name")
        .name_key(vnode_key)
        .name_key("if_name")
        .value("description", FieldKind::Text, DESC_WIDTH)
        .value("admin_status", FieldKind::U8, 0)
        .scoped()
        .with_status()
}

impl SchemaRegistry {
    /// Registry holding the schemas of every built-in object type.
    ///
    /// # Errors
    ///
    /// Fails with a generic error if a built-in declaration is ill-formed.
    pub fn builtin() -> UpllResult<Self> {
        use FieldKind::{Ipv4, Mac, Text, U8, U16, U32};
        use ObjectType as T;
        let builders = [
            // VTN
            TableSchemaBuilder::new(T::Vtn, TableKind::Main)
                .name_key("vtn_name")
                .value("description", Text, DESC_WIDTH)
                .state("creation_time", U32, 0)
                .state("last_updated_time", U32, 0)
                .with_status(),
            TableSchemaBuilder::new(T::Vtn, TableKind::Controller)
                .name_key("vtn_name")
                .value("ref_count", U32, 0)
                .controller_scoped()
                .with_status(),
            TableSchemaBuilder::new(T::Vtn, TableKind::Rename)
                .name_key("vtn_name")
                .value("ctrlr_vtn_name", Text, 31)
                .controller_scoped(),
            // vBridge
            TableSchemaBuilder::new(T::Vbridge, TableKind::Main)
                .name_key("vtn_name")
                .name_key("vbr_name")
                .value("description", Text, DESC_WIDTH)
                .value("host_addr", Ipv4, 0)
                .value("host_addr_prefixlen", U8, 0)
                .scoped()
                .with_status(),
            vnode_rename(T::Vbridge, "vbr_name"),
            TableSchemaBuilder::new(T::Vbridge, TableKind::Convert)
                .name_key("vtn_name")
                .name_key("vbr_name")
                .value("conv_vbr_name", Text, 31)
                .value("label", U32, 0)
                .controller_scoped(),
            vnode_if(T::VbrIf, "vbr_name")
                .value("logical_port_id", Text, PORT_WIDTH)
                .value("vlan_id", U16, 0),
            TableSchemaBuilder::new(T::VbrVlanMap, TableKind::Main)
                .name_key("vtn_name")
                .name_key("vbr_name")
                .key("logical_port_id", Text, PORT_WIDTH)
                .value("vlan_id", U16, 0)
                .scoped(),
            // vRouter
            TableSchemaBuilder::new(T::Vrouter, TableKind::Main)
                .name_key("vtn_name")
                .name_key("vrt_name")
                .value("description", Text, DESC_WIDTH)
                .value("dhcp_relay_admin_status", U8, 0)
                .scoped()
                .with_status(),
            vnode_rename(T::Vrouter, "vrt_name"),
            TableSchemaBuilder::new(T::VrtIf, TableKind::Main)
                .name_key("vtn_name")
                .name_key("vrt_name")
                .name_key("if_name")
                .value("description", Text, DESC_WIDTH)
                .value("ip_addr", Ipv4, 0)
                .value("prefixlen", U8, 0)
                .value("mac_addr", Mac, 0)
                .value("admin_status", U8, 0)
                .scoped()
                .with_status(),
            // vTerminal
            TableSchemaBuilder::new(T::Vterminal, TableKind::Main)
                .name_key("vtn_name")
                .name_key("vterminal_name")
                .value("description", Text, DESC_WIDTH)
                .scoped()
                .with_status(),
            vnode_rename(T::Vterminal, "vterminal_name"),
            vnode_if(T::VtermIf, "vterminal_name")
                .value("logical_port_id", Text, PORT_WIDTH)
                .value("vlan_id", U16, 0),
            // vTunnel
            TableSchemaBuilder::new(T::Vtunnel, TableKind::Main)
                .name_key("vtn_name")
                .name_key("vtunnel_name")
                .value("description", Text, DESC_WIDTH)
                .value("underlay_vtn_name", Text, 31)
                .value("label", U32, 0)
                .scoped()
                .with_status(),
            vnode_if(T::VtunnelIf, "vtunnel_name"),
            // flow filters
            TableSchemaBuilder::new(T::IfFlowFilter, TableKind::Main)
                .name_key("vtn_name")
                .name_key("vnode_name")
                .name_key("if_name")
                .key("direction", U8, 0)
                .scoped(),
            TableSchemaBuilder::new(T::VtnFlowFilter, TableKind::Main)
                .name_key("vtn_name")
                .key("direction", U8, 0),
            TableSchemaBuilder::new(T::VtnFlowFilterEntry, TableKind::Main)
                .name_key("vtn_name")
                .key("direction", U8, 0)
                .key("sequence_num", U16, 0)
                .value("flowlist_name", Text, 32)
                .value("action", U8, 0)
                .value("nwm_name", Text, 31)
                .value("dscp", U8, 0)
                .value("priority", U8, 0),
            // flow lists
            TableSchemaBuilder::new(T::FlowList, TableKind::Main)
                .key("flowlist_name", Text, 32)
                .value("ip_type", U8, 0),
            TableSchemaBuilder::new(T::FlowList, TableKind::Rename)
                .key("flowlist_name", Text, 32)
                .value("ctrlr_flowlist_name", Text, 32)
                .controller_scoped(),
            TableSchemaBuilder::new(T::FlowListEntry, TableKind::Main)
                .key("flowlist_name", Text, 32)
                .key("sequence_num", U16, 0)
                .value("mac_dst", Mac, 0)
                .value("dst_ip", Ipv4, 0)
                .value("ip_proto", U8, 0)
                .value("vlan_priority", U8, 0),
            // policing profiles
            TableSchemaBuilder::new(T::PolicingProfile, TableKind::Main)
                .key("policingprofile_name", Text, 32),
            TableSchemaBuilder::new(T::PolicingProfile, TableKind::Rename)
                .key("policingprofile_name", Text, 32)
                .value("ctrlr_policingprofile_name", Text, 32)
                .controller_scoped(),
            TableSchemaBuilder::new(T::PolicingProfileEntry, TableKind::Main)
                .key("policingprofile_name", Text, 32)
                .key("sequence_num", U8, 0)
                .value("flowlist", Text, 32)
                .value("rate", U8, 0)
                .value("cir", U32, 0)
                .value("cbs", U32, 0)
                .value("pir", U32, 0)
                .value("pbs", U32, 0),
            // unified network binding
            TableSchemaBuilder::new(T::VtnUnified, TableKind::Main)
                .name_key("vtn_name")
                .name_key("unified_nw_id")
                .value("label", U32, 0)
                .scoped(),
        ];
        let mut registry = SchemaRegistry::new();
        for builder in builders {
            registry.register(builder.build()?);
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod test {
    use super::attrs;
    use crate::key::ObjectType;
    use crate::schema::{SchemaRegistry, Slot, TableKind};
    use strum::IntoEnumIterator;

    fn column(reg: &SchemaRegistry, otype: ObjectType, kind: TableKind, index: usize) -> String {
        reg.get(otype, kind)
            .unwrap()
            .descriptor(Slot::Config(index))
            .unwrap()
            .column
            .clone()
    }

    #[test]
    fn every_type_has_a_main_table() {
        let reg = SchemaRegistry::builtin().unwrap();
        for otype in ObjectType::iter() {
            assert!(reg.has(otype, TableKind::Main), "{otype}");
        }
        assert!(reg.has(ObjectType::Vtn, TableKind::Controller));
        assert!(reg.has(ObjectType::Vbridge, TableKind::Convert));
        assert!(!reg.has(ObjectType::VbrIf, TableKind::Rename));
    }

    #[test]
    fn attribute_indices_match_columns() {
        let reg = SchemaRegistry::builtin().unwrap();
        let checks = [
            (ObjectType::Vtn, TableKind::Main, attrs::vtn::DESCRIPTION, "description"),
            (ObjectType::Vtn, TableKind::Controller, attrs::vtn_ctrlr::REF_COUNT, "ref_count"),
            (ObjectType::Vtn, TableKind::Rename, attrs::vtn_rename::CTRLR_VTN_NAME, "ctrlr_vtn_name"),
            (ObjectType::Vbridge, TableKind::Main, attrs::vbr::HOST_ADDR, "host_addr"),
            (ObjectType::Vbridge, TableKind::Rename, attrs::vnode_rename::CTRLR_VNODE_NAME, "ctrlr_vnode_name"),
            (ObjectType::Vbridge, TableKind::Convert, attrs::vbr_convert::LABEL, "label"),
            (ObjectType::VbrIf, TableKind::Main, attrs::vbr_if::LOGICAL_PORT_ID, "logical_port_id"),
            (ObjectType::VbrIf, TableKind::Main, attrs::vbr_if::VLAN_ID, "vlan_id"),
            (ObjectType::VtermIf, TableKind::Main, attrs::vterm_if::VLAN_ID, "vlan_id"),
            (ObjectType::VrtIf, TableKind::Main, attrs::vrt_if::ADMIN_STATUS, "admin_status"),
            (ObjectType::Vtunnel, TableKind::Main, attrs::vtunnel::LABEL, "label"),
            (ObjectType::VtunnelIf, TableKind::Main, attrs::vtunnel_if::ADMIN_STATUS, "admin_status"),
            (ObjectType::FlowListEntry, TableKind::Main, attrs::flowlist_entry::VLAN_PRIORITY, "vlan_priority"),
            (ObjectType::PolicingProfileEntry, TableKind::Main, attrs::policingprofile_entry::PBS, "pbs"),
            (ObjectType::VtnFlowFilterEntry, TableKind::Main, attrs::vtn_flowfilter_entry::PRIORITY, "priority"),
            (ObjectType::VtnUnified, TableKind::Main, attrs::vtn_unified::LABEL, "label"),
        ];
        for (otype, kind, index, expected) in checks {
            assert_eq!(column(&reg, otype, kind, index), expected, "{otype} {kind}");
        }
    }

    #[test]
    fn aggregating_types_have_status_columns() {
        let reg = SchemaRegistry::builtin().unwrap();
        for otype in [
            ObjectType::Vtn,
            ObjectType::Vbridge,
            ObjectType::VbrIf,
            ObjectType::Vrouter,
            ObjectType::VrtIf,
            ObjectType::Vterminal,
            ObjectType::VtermIf,
            ObjectType::Vtunnel,
            ObjectType::VtunnelIf,
        ] {
            assert!(reg.get(otype, TableKind::Main).unwrap().has_status(), "{otype}");
        }
        assert!(reg.get(ObjectType::Vtn, TableKind::Controller).unwrap().has_status());
        assert!(!reg.get(ObjectType::VbrVlanMap, TableKind::Main).unwrap().has_status());
    }
}
