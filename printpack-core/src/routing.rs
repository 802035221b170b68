//! Which pack (and variant) prints a given business document.

use crate::engine::PackRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackRoute {
    pub pack_code: &'static str,
    pub variant: &'static str,
    /// Empty for routes that print a whole pack rather than one document.
    pub doc_type: &'static str,
}

impl PackRoute {
    /// A [`PackRequest`] for this route, without shipment or carton.
    pub fn request(&self) -> PackRequest {
        PackRequest::new(self.pack_code).variant(self.variant)
    }
}

const DOCUMENT_ROUTES: &[PackRoute] = &[
    PackRoute {
        pack_code: "C",
        variant: "shipment",
        doc_type: "shipment_note",
    },
    PackRoute {
        pack_code: "B",
        variant: "shipment",
        doc_type: "packing_list_shipment",
    },
    PackRoute {
        pack_code: "B",
        variant: "shipment",
        doc_type: "donation_certificate",
    },
];

pub fn resolve_pack_request(doc_type: &str) -> Option<PackRoute> {
    let doc_type = doc_type.trim();
    DOCUMENT_ROUTES
        .iter()
        .find(|route| route.doc_type == doc_type)
        .copied()
}

pub fn carton_picking_pack() -> PackRoute {
    PackRoute {
        pack_code: "A",
        variant: "single_carton",
        doc_type: "",
    }
}

pub fn shipment_labels_pack() -> PackRoute {
    PackRoute {
        pack_code: "D",
        variant: "all_labels",
        doc_type: "",
    }
}

pub fn single_label_pack() -> PackRoute {
    PackRoute {
        pack_code: "D",
        variant: "single_label",
        doc_type: "",
    }
}

pub fn carton_packing_pack() -> PackRoute {
    PackRoute {
        pack_code: "B",
        variant: "per_carton_single",
        doc_type: "",
    }
}
