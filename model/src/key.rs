// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Hierarchical object keys.

use crate::errors::{UpllError, UpllResult};
use crate::value::FieldValue;
use std::fmt::Display;
use strum::{EnumIter, IntoEnumIterator};

/// Type tag of a configuration object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectType {
    #[strum(serialize = "vtn")]
    Vtn,
    #[strum(serialize = "vbr")]
    Vbridge,
    #[strum(serialize = "vbr_if")]
    VbrIf,
    #[strum(serialize = "vbr_vlanmap")]
    VbrVlanMap,
    #[strum(serialize = "vrt")]
    Vrouter,
    #[strum(serialize = "vrt_if")]
    VrtIf,
    #[strum(serialize = "vterm")]
    Vterminal,
    #[strum(serialize = "vterm_if")]
    VtermIf,
    #[strum(serialize = "vtunnel")]
    Vtunnel,
    #[strum(serialize = "vtunnel_if")]
    VtunnelIf,
    /// Interface flow-filter, child of both vBridge and vRouter interfaces.
    #[strum(serialize = "if_flowfilter")]
    IfFlowFilter,
    #[strum(serialize = "flowlist")]
    FlowList,
    #[strum(serialize = "flowlist_entry")]
    FlowListEntry,
    #[strum(serialize = "policingprofile")]
    PolicingProfile,
    #[strum(serialize = "policingprofile_entry")]
    PolicingProfileEntry,
    #[strum(serialize = "vtn_flowfilter")]
    VtnFlowFilter,
    #[strum(serialize = "vtn_flowfilter_entry")]
    VtnFlowFilterEntry,
    /// Binding of a VTN onto a unified network. Holds a GVTNID.
    #[strum(serialize = "vtn_unified")]
    VtnUnified,
}

impl ObjectType {
    /// Declared children, in cascade order.
    #[must_use]
    pub fn children(self) -> &'static [ObjectType] {
        use ObjectType::{
            FlowList, FlowListEntry, IfFlowFilter, PolicingProfile, PolicingProfileEntry, VbrIf,
            VbrVlanMap, Vbridge, Vrouter, VrtIf, VtermIf, Vterminal, Vtn, VtnFlowFilter,
            VtnFlowFilterEntry, VtnUnified, Vtunnel, VtunnelIf,
        };
        match self {
            Vtn => &[Vbridge, Vrouter, Vterminal, Vtunnel, VtnFlowFilter, VtnUnified],
            Vbridge => &[VbrIf, VbrVlanMap],
            VbrIf | VrtIf => &[IfFlowFilter],
            Vrouter => &[VrtIf],
            Vterminal => &[VtermIf],
            Vtunnel => &[VtunnelIf],
            VtnFlowFilter => &[VtnFlowFilterEntry],
            FlowList => &[FlowListEntry],
            PolicingProfile => &[PolicingProfileEntry],
            VbrVlanMap | VtermIf | VtunnelIf | IfFlowFilter | FlowListEntry
            | PolicingProfileEntry | VtnFlowFilterEntry | VtnUnified => &[],
        }
    }

    /// Types declaring this one as a child. More than one for shared children.
    #[must_use]
    pub fn parents(self) -> Vec<ObjectType> {
        ObjectType::iter()
            .filter(|p| p.children().contains(&self))
            .collect()
    }

    #[must_use]
    pub fn is_root(self) -> bool {
        self.parents().is_empty()
    }

    /// Every type, parents before children.
    #[must_use]
    pub fn hierarchy_order() -> Vec<ObjectType> {
        fn visit(t: ObjectType, out: &mut Vec<ObjectType>) {
            if out.contains(&t) || t.parents().iter().any(|p| !out.contains(p)) {
                return;
            }
            out.push(t);
            for c in t.children() {
                visit(*c, out);
            }
        }
        let mut out = Vec::new();
        for root in ObjectType::iter().filter(|t| t.is_root()) {
            visit(root, &mut out);
        }
        out
    }

    /// Number of key fields.
    #[must_use]
    pub fn key_arity(self) -> usize {
        use ObjectType::{
            FlowList, FlowListEntry, IfFlowFilter, PolicingProfile, PolicingProfileEntry, VbrIf,
            VbrVlanMap, Vbridge, Vrouter, VrtIf, VtermIf, Vterminal, Vtn, VtnFlowFilter,
            VtnFlowFilterEntry, VtnUnified, Vtunnel, VtunnelIf,
        };
        match self {
            Vtn | FlowList | PolicingProfile => 1,
            Vbridge | Vrouter | Vterminal | Vtunnel | VtnFlowFilter | VtnUnified
            | FlowListEntry | PolicingProfileEntry => 2,
            VbrIf | VbrVlanMap | VrtIf | VtermIf | VtunnelIf | VtnFlowFilterEntry => 3,
            IfFlowFilter => 4,
        }
    }

    /// Tell if objects of this type live under a tenant.
    #[must_use]
    pub fn is_tenant_scoped(self) -> bool {
        !matches!(
            self,
            ObjectType::FlowList
                | ObjectType::FlowListEntry
                | ObjectType::PolicingProfile
                | ObjectType::PolicingProfileEntry
        )
    }

    #[must_use]
    pub fn is_vnode(self) -> bool {
        matches!(
            self,
            ObjectType::Vbridge | ObjectType::Vrouter | ObjectType::Vterminal | ObjectType::Vtunnel
        )
    }

    #[must_use]
    pub fn is_vnode_if(self) -> bool {
        matches!(
            self,
            ObjectType::VbrIf | ObjectType::VrtIf | ObjectType::VtermIf | ObjectType::VtunnelIf
        )
    }
}

/// Identifier of an object: a type tag and its ordered key fields, ancestors first.
/// A `None` field is a wildcard, only legal in match patterns.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    otype: ObjectType,
    fields: Vec<Option<FieldValue>>,
}

fn text(s: &str) -> Option<FieldValue> {
    Some(FieldValue::text(s))
}

impl ObjectKey {
    /// Build a key from its fields.
    ///
    /// # Errors
    ///
    /// Fails with [`UpllError::Generic`] if the number of fields does not match the type.
    pub fn new(otype: ObjectType, fields: Vec<Option<FieldValue>>) -> UpllResult<Self> {
        if fields.len() != otype.key_arity() {
            return Err(UpllError::Generic(format!(
                "{otype} key takes {} fields, got {}",
                otype.key_arity(),
                fields.len()
            )));
        }
        Ok(Self { otype, fields })
    }

    fn build(otype: ObjectType, fields: Vec<Option<FieldValue>>) -> Self {
        debug_assert_eq!(fields.len(), otype.key_arity());
        Self { otype, fields }
    }

    /// A key matching every object of a type.
    #[must_use]
    pub fn wildcard(otype: ObjectType) -> Self {
        Self::build(otype, vec![None; otype.key_arity()])
    }

    #[must_use]
    pub fn vtn(vtn: &str) -> Self {
        Self::build(ObjectType::Vtn, vec![text(vtn)])
    }
    #[must_use]
    pub fn vbridge(vtn: &str, vbr: &str) -> Self {
        Self::build(ObjectType::Vbridge, vec![text(vtn), text(vbr)])
    }
    #[must_use]
    pub fn vbr_if(vtn: &str, vbr: &str, ifname: &str) -> Self {
        Self::build(ObjectType::VbrIf, vec![text(vtn), text(vbr), text(ifname)])
    }
    #[must_use]
    pub fn vlan_map(vtn: &str, vbr: &str, map_id: &str) -> Self {
        Self::build(ObjectType::VbrVlanMap, vec![text(vtn), text(vbr), text(map_id)])
    }
    #[must_use]
    pub fn vrouter(vtn: &str, vrt: &str) -> Self {
        Self::build(ObjectType::Vrouter, vec![text(vtn), text(vrt)])
    }
    #[must_use]
    pub fn vrt_if(vtn: &str, vrt: &str, ifname: &str) -> Self {
        Self::build(ObjectType::VrtIf, vec![text(vtn), text(vrt), text(ifname)])
    }
    #[must_use]
    pub fn vterminal(vtn: &str, vterm: &str) -> Self {
        Self::build(ObjectType::Vterminal, vec![text(vtn), text(vterm)])
    }
    #[must_use]
    pub fn vterm_if(vtn: &str, vterm: &str, ifname: &str) -> Self {
        Self::build(ObjectType::VtermIf, vec![text(vtn), text(vterm), text(ifname)])
    }
    #[must_use]
    pub fn vtunnel(vtn: &str, vtunnel: &str) -> Self {
        Self::build(ObjectType::Vtunnel, vec![text(vtn), text(vtunnel)])
    }
    #[must_use]
    pub fn vtunnel_if(vtn: &str, vtunnel: &str, ifname: &str) -> Self {
        Self::build(ObjectType::VtunnelIf, vec![text(vtn), text(vtunnel), text(ifname)])
    }
    #[must_use]
    pub fn if_flowfilter(vtn: &str, vnode: &str, ifname: &str, direction: u8) -> Self {
        Self::build(
            ObjectType::IfFlowFilter,
            vec![text(vtn), text(vnode), text(ifname), Some(FieldValue::U8(direction))],
        )
    }
    #[must_use]
    pub fn flowlist(name: &str) -> Self {
        Self::build(ObjectType::FlowList, vec![text(name)])
    }
    #[must_use]
    pub fn flowlist_entry(name: &str, seq: u16) -> Self {
        Self::build(ObjectType::FlowListEntry, vec![text(name), Some(FieldValue::U16(seq))])
    }
    #[must_use]
    pub fn policing_profile(name: &str) -> Self {
        Self::build(ObjectType::PolicingProfile, vec![text(name)])
    }
    #[must_use]
    pub fn policing_profile_entry(name: &str, seq: u8) -> Self {
        Self::build(
            ObjectType::PolicingProfileEntry,
            vec![text(name), Some(FieldValue::U8(seq))],
        )
    }
    #[must_use]
    pub fn vtn_flowfilter(vtn: &str, direction: u8) -> Self {
        Self::build(
            ObjectType::VtnFlowFilter,
            vec![text(vtn), Some(FieldValue::U8(direction))],
        )
    }
    #[must_use]
    pub fn vtn_flowfilter_entry(vtn: &str, direction: u8, seq: u16) -> Self {
        Self::build(
            ObjectType::VtnFlowFilterEntry,
            vec![text(vtn), Some(FieldValue::U8(direction)), Some(FieldValue::U16(seq))],
        )
    }
    #[must_use]
    pub fn vtn_unified(vtn: &str, unified_nw: &str) -> Self {
        Self::build(ObjectType::VtnUnified, vec![text(vtn), text(unified_nw)])
    }

    #[must_use]
    pub fn otype(&self) -> ObjectType {
        self.otype
    }

    #[must_use]
    pub fn fields(&self) -> &[Option<FieldValue>] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, index: usize) -> Option<&FieldValue> {
        self.fields.get(index).and_then(Option::as_ref)
    }

    /// Set one key field.
    ///
    /// # Errors
    ///
    /// Fails with [`UpllError::Generic`] if the index is beyond the key arity.
    pub fn set_field(&mut self, index: usize, value: Option<FieldValue>) -> UpllResult {
        match self.fields.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(UpllError::Generic(format!(
                "{} has no key field {index}",
                self.otype
            ))),
        }
    }

    /// The tenant this key lives under, if any.
    #[must_use]
    pub fn tenant(&self) -> Option<&str> {
        if self.otype.is_tenant_scoped() {
            self.field(0).and_then(FieldValue::as_str)
        } else {
            None
        }
    }

    /// The last key field rendered as a name, if it is set.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.fields.last().and_then(Option::as_ref).map(ToString::to_string)
    }

    /// Tell if no key field is a wildcard.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.fields.iter().all(Option::is_some)
    }

    /// Number of leading fields that are set.
    #[must_use]
    pub fn bound_prefix_len(&self) -> usize {
        self.fields.iter().take_while(|f| f.is_some()).count()
    }

    /// Pattern matching all children of type `child` under this key. The child key reuses the
    /// fields of this key as its leading fields and leaves its own fields as wildcards.
    ///
    /// # Errors
    ///
    /// Fails with [`UpllError::Generic`] if `child` is not a declared child of this type.
    pub fn child_pattern(&self, child: ObjectType) -> UpllResult<ObjectKey> {
        if !self.otype.children().contains(&child) {
            return Err(UpllError::Generic(format!(
                "{child} is not a child of {}",
                self.otype
            )));
        }
        let mut fields = self.fields.clone();
        fields.resize(child.key_arity(), None);
        Ok(ObjectKey::build(child, fields))
    }

    /// The key of the parent of type `parent`.
    /// `None` for roots, for a non-parent type or if a parent field is a wildcard.
    #[must_use]
    pub fn parent(&self, parent: ObjectType) -> Option<ObjectKey> {
        if !parent.children().contains(&self.otype) {
            return None;
        }
        let fields: Vec<_> = self.fields[..parent.key_arity()].to_vec();
        if fields.iter().any(Option::is_none) {
            return None;
        }
        Some(ObjectKey::build(parent, fields))
    }

    /// Tell if `other` is matched by this key used as a pattern.
    #[must_use]
    pub fn matches(&self, other: &ObjectKey) -> bool {
        self.otype == other.otype
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(p, v)| p.is_none() || p == v)
    }

    /// Tell if this key equals `ancestor` on the ancestor's fields.
    #[must_use]
    pub fn descends_from(&self, ancestor: &ObjectKey) -> bool {
        let n = ancestor.fields.len();
        n <= self.fields.len()
            && ancestor
                .fields
                .iter()
                .zip(&self.fields[..n])
                .all(|(a, s)| a.is_none() || a == s)
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ", self.otype)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            match field {
                Some(v) => write!(f, "{v}")?,
                None => write!(f, "*")?,
            }
        }
        Ok(())
    }
}
