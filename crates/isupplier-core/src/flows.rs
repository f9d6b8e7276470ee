//! Guided flows offered as quick actions
//!
//! Each flow is started by sending its trigger phrase, which the backend's
//! NLU maps to the flow's intent.

use crate::lang::Lang;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    SupplierRegistration,
    ForgotPassword,
    WorkConfirmation,
    InvoiceCreation,
    ViewInvoices,
    ViewPayments,
    ResolveHolds,
}

impl Flow {
    pub fn all() -> Vec<Flow> {
        vec![
            Flow::SupplierRegistration,
            Flow::ForgotPassword,
            Flow::WorkConfirmation,
            Flow::InvoiceCreation,
            Flow::ViewInvoices,
            Flow::ViewPayments,
            Flow::ResolveHolds,
        ]
    }

    pub fn id(&self) -> &'static str {
        match self {
            Flow::SupplierRegistration => "supplierRegistration",
            Flow::ForgotPassword => "forgotPassword",
            Flow::WorkConfirmation => "workConfirmation",
            Flow::InvoiceCreation => "invoiceCreation",
            Flow::ViewInvoices => "viewInvoices",
            Flow::ViewPayments => "viewPayments",
            Flow::ResolveHolds => "resolveHolds",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::all().into_iter().find(|flow| flow.id() == id)
    }

    pub fn priority(&self) -> Priority {
        match self {
            Flow::SupplierRegistration | Flow::WorkConfirmation | Flow::InvoiceCreation => {
                Priority::Primary
            }
            _ => Priority::Secondary,
        }
    }

    pub fn label(&self, lang: Lang) -> &'static str {
        match self {
            Flow::SupplierRegistration => lang.pick("Supplier Registration", "Référencement fournisseur"),
            Flow::ForgotPassword => lang.pick("Assistance / Forgot Password", "Assistance / Mot de passe oublié"),
            Flow::WorkConfirmation => lang.pick("Work Confirmation", "Confirmation de travaux"),
            Flow::InvoiceCreation => lang.pick("Create Invoice (with PO)", "Créer une facture (avec BC)"),
            Flow::ViewInvoices => lang.pick("View Invoices / Status", "Consulter les factures / statut"),
            Flow::ViewPayments => lang.pick("View Payments", "Consulter les paiements"),
            Flow::ResolveHolds => lang.pick("Resolve Invoice Holds", "Débloquer les factures en attente"),
        }
    }

    /// Utterance that starts this flow on the backend
    pub fn trigger(&self, lang: Lang) -> &'static str {
        match self {
            Flow::SupplierRegistration => lang.pick("supplier registration", "référencement fournisseur"),
            Flow::ForgotPassword => lang.pick("reset password", "mot de passe oublié"),
            Flow::WorkConfirmation => lang.pick("work confirmation", "confirmation travaux"),
            Flow::InvoiceCreation => lang.pick("create invoice", "créer facture"),
            Flow::ViewInvoices => lang.pick("invoice details", "détails facture"),
            Flow::ViewPayments => lang.pick("payment status", "statut paiement"),
            Flow::ResolveHolds => lang.pick("pending invoices", "factures en attente"),
        }
    }
}

/// Trigger for a flow id, falling back to a help request for unknown ids
pub fn trigger_for(flow_id: &str, lang: Lang) -> &'static str {
    Flow::from_id(flow_id)
        .map(|flow| flow.trigger(lang))
        .unwrap_or_else(|| lang.pick("help", "aide"))
}

/// Utterance that abandons the active flow
pub const EXIT_UTTERANCE: &str = "stop";

pub fn next_step_utterance(lang: Lang) -> &'static str {
    lang.pick("next", "suivant")
}

pub fn previous_step_utterance(lang: Lang) -> &'static str {
    lang.pick("previous", "précédent")
}
