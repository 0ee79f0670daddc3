//! Flow fixtures.

use crate::flow::Flow;

/// Creates a flow with the given sources declared.
pub fn flow_with_sources(name: &str, sources: &[(&str, &[&str])]) -> Flow {
    let mut flow = Flow::new(name);
    for (source, fields) in sources {
        if let Err(err) = flow.source(*source, fields.to_vec()) {
            panic!("Invalid fixture source '{source}': {err}");
        }
    }
    flow
}

/// An `orders` stage keyed on `order_id` and a `customers` stage keyed on
/// `cust_id`.
pub fn orders_customers_flow() -> Flow {
    let mut flow = flow_with_sources(
        "orders_customers",
        &[
            ("orders", &["order_id", "cust_id", "amount"]),
            ("customers", &["cust_id", "name"]),
        ],
    );
    let declared = flow
        .assembly("orders", |a| {
            a.primary("order_id")?;
            Ok(())
        })
        .and_then(|_| {
            flow.assembly("customers", |a| {
                a.primary("cust_id")?;
                Ok(())
            })
        });
    if let Err(err) = declared {
        panic!("Invalid orders/customers fixture: {err}");
    }
    flow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_primary_key, assert_values_fields};

    #[test]
    fn test_orders_customers_fixture() {
        let flow = orders_customers_flow();
        assert_values_fields(&flow, "orders", &["order_id", "cust_id", "amount"]);
        assert_primary_key(&flow, "customers", &["cust_id"]);
    }
}
