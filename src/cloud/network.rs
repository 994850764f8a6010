//! CS-006: Network resources (VPC, subnets, route tables, routes, gateway).
//!
//! Also owns IPv4 CIDR parsing used by validation (containment, overlap).

use super::{required_str, Properties, RenderCtx};
use crate::core::types::CloudResource;
use serde_json::Value;
use std::fmt;
use std::net::Ipv4Addr;

/// An IPv4 CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    pub addr: Ipv4Addr,
    pub prefix: u8,
}

impl Cidr {
    /// Parse `a.b.c.d/n`. Host bits must be zero.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("'{}' is not a CIDR block (missing /prefix)", s))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|e| format!("'{}' has an invalid address: {}", s, e))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| format!("'{}' has an invalid prefix length", s))?;
        if prefix > 32 {
            return Err(format!("'{}' prefix length exceeds 32", s));
        }
        let cidr = Self { addr, prefix };
        if u32::from(addr) & !cidr.mask() != 0 {
            return Err(format!("'{}' has host bits set", s));
        }
        Ok(cidr)
    }

    fn mask(&self) -> u32 {
        match self.prefix {
            0 => 0,
            p => u32::MAX << (32 - u32::from(p)),
        }
    }

    fn first(&self) -> u32 {
        u32::from(self.addr)
    }

    fn last(&self) -> u32 {
        self.first() | !self.mask()
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Cidr) -> bool {
        self.prefix <= other.prefix && other.first() & self.mask() == self.first()
    }

    /// True when the two blocks share any address.
    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.first() <= other.last() && other.first() <= self.last()
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

pub fn vpc_properties(id: &str, resource: &CloudResource) -> Result<Properties, String> {
    let mut props = Properties::new();
    props.insert(
        "cidrBlock".to_string(),
        required_str(id, "cidr_block", &resource.cidr_block)?,
    );
    Ok(props)
}

pub fn subnet_properties(
    id: &str,
    resource: &CloudResource,
    ctx: &RenderCtx,
) -> Result<Properties, String> {
    let mut props = Properties::new();
    props.insert("vpcId".to_string(), ctx.required_id(id, "vpc", &resource.vpc)?);
    props.insert(
        "cidrBlock".to_string(),
        required_str(id, "cidr_block", &resource.cidr_block)?,
    );
    if let Some(ref az) = resource.availability_zone {
        props.insert("availabilityZone".to_string(), Value::String(az.clone()));
    }
    Ok(props)
}

/// Route tables and internet gateways only carry their VPC.
pub fn vpc_child_properties(
    id: &str,
    resource: &CloudResource,
    ctx: &RenderCtx,
) -> Result<Properties, String> {
    let mut props = Properties::new();
    props.insert("vpcId".to_string(), ctx.required_id(id, "vpc", &resource.vpc)?);
    Ok(props)
}

pub fn route_properties(
    id: &str,
    resource: &CloudResource,
    ctx: &RenderCtx,
) -> Result<Properties, String> {
    let mut props = Properties::new();
    props.insert(
        "routeTableId".to_string(),
        ctx.required_id(id, "route_table", &resource.route_table)?,
    );
    props.insert(
        "destinationCidrBlock".to_string(),
        required_str(id, "destination_cidr_block", &resource.destination_cidr_block)?,
    );
    props.insert(
        "gatewayId".to_string(),
        ctx.required_id(id, "gateway", &resource.gateway)?,
    );
    Ok(props)
}

pub fn association_properties(
    id: &str,
    resource: &CloudResource,
    ctx: &RenderCtx,
) -> Result<Properties, String> {
    let mut props = Properties::new();
    props.insert("subnetId".to_string(), ctx.required_id(id, "subnet", &resource.subnet)?);
    props.insert(
        "routeTableId".to_string(),
        ctx.required_id(id, "route_table", &resource.route_table)?,
    );
    Ok(props)
}
