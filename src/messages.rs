//! Reply texts. Every correction carries a concrete example of the expected
//! input, since the chat has no form validation of its own.
use rust_decimal::Decimal;

use crate::model::{Currency, Invoice, PayoutDetails, Product, QuotaStatus};
use crate::session::PendingPriceSession;

pub const EXAMPLE_INVOICE: &str = "Invoice Joy 08012345678, 12000 wig";
pub const EXAMPLE_MULTI_LINE: &str = "Invoice Joy 08012345678, 2 wig 12000, 1 shoe 8500";

pub fn help() -> String {
    format!(
        "👋 To create an invoice, send the word *invoice*, the customer's name and phone, then the items.\n\
         Example: {EXAMPLE_INVOICE}\n\
         For several items: {EXAMPLE_MULTI_LINE}\n\
         Send *catalog* to pick from your products, or *cancel* to start over."
    )
}

pub fn unknown_sender() -> String {
    format!(
        "This number is not linked to a business account yet. Sign up and verify this phone number, then send for example: {EXAMPLE_INVOICE}"
    )
}

pub fn unverified_sender(business_name: &str) -> String {
    format!(
        "This number is registered to {business_name} but has not been verified. Verify it in your account settings, then send for example: {EXAMPLE_INVOICE}"
    )
}

pub fn voice_not_understood() -> String {
    format!("Sorry, I could not understand that voice note. Please type it instead, e.g. {EXAMPLE_INVOICE}")
}

pub fn image_without_caption() -> String {
    format!("I can only read the caption on images. Add the invoice details as a caption, e.g. {EXAMPLE_INVOICE}")
}

pub fn unsupported(kind: &str) -> String {
    format!("I can't handle {kind} messages yet. Send text instead, e.g. {EXAMPLE_INVOICE}")
}

pub fn cancelled() -> String {
    "Cancelled. Nothing was created.".to_string()
}

pub fn nothing_to_cancel() -> String {
    format!("There is nothing to cancel. Start a new invoice with e.g. {EXAMPLE_INVOICE}")
}

pub fn generic_failure() -> String {
    format!(
        "Something went wrong creating that invoice. Please check the format and try again, e.g. {EXAMPLE_INVOICE}"
    )
}

// Guard failures

pub fn amount_too_low(min: Decimal, currency: Currency) -> String {
    format!(
        "The invoice amount is missing or below {}. Put a price next to each item, e.g. {EXAMPLE_INVOICE}",
        currency.format(min)
    )
}

pub fn name_missing() -> String {
    format!("Who is the invoice for? Put the customer's name right after *invoice*, e.g. {EXAMPLE_INVOICE}")
}

pub fn suspicious_amount(amount: Decimal, currency: Currency) -> String {
    format!(
        "Heads up: {} looks unusual. If that's not what you meant, write prices without spaces inside numbers and one item per comma, e.g. {EXAMPLE_MULTI_LINE}",
        currency.format(amount)
    )
}

pub fn purchase_prompt(status: &QuotaStatus) -> String {
    format!(
        "You have no invoices left on your {} plan. Buy a pack of {} invoices for {} to continue, then resend your message, e.g. {EXAMPLE_INVOICE}",
        status.plan,
        status.pack_size,
        Currency::NGN.format(status.pack_price)
    )
}

pub fn balance_exhausted() -> String {
    format!(
        "Your invoice balance ran out. Buy a pack in your dashboard, then resend your message, e.g. {EXAMPLE_INVOICE}"
    )
}

pub fn missing_payout_details() -> String {
    format!(
        "Add your bank details (bank name, account number, account name) in settings so customers know where to pay. Then resend, e.g. {EXAMPLE_INVOICE}"
    )
}

pub fn validation_failed(detail: &str) -> String {
    format!("That invoice could not be created: {detail}. Try again like this: {EXAMPLE_INVOICE}")
}

pub fn low_balance(status: &QuotaStatus) -> String {
    format!(
        "⚠️ Only {} invoice(s) left on your {} plan. Top up with a pack of {} for {}.",
        status.balance,
        status.plan,
        status.pack_size,
        Currency::NGN.format(status.pack_price)
    )
}

// Prices

pub fn partial_catalog_match(matched: &[String], unmatched: &[String]) -> String {
    format!(
        "I found prices for {} in your catalog but not for {}. Resend with a price for every item, e.g. {EXAMPLE_MULTI_LINE}",
        join_or_none(matched),
        unmatched.join(", ")
    )
}

pub fn ask_prices(session: &PendingPriceSession) -> String {
    format!(
        "What is the unit price of each item?\n{}\nReply with one price per item in this order, e.g. {}",
        session.item_list(),
        price_example(session.lines.len())
    )
}

pub fn price_reply_unparseable(session: &PendingPriceSession) -> String {
    format!(
        "I couldn't match that to the items. I still need a price for:\n{}\nReply like: {} (or send *cancel*)",
        session.item_list(),
        price_example(session.lines.len())
    )
}

fn price_example(n: usize) -> String {
    let samples = ["5000", "3000", "1500", "800"];
    (0..n.max(1))
        .map(|i| samples[i % samples.len()])
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

// Cart

pub fn catalog_empty() -> String {
    format!("Your catalog is empty. Add products in your dashboard, or type the invoice, e.g. {EXAMPLE_INVOICE}")
}

pub fn no_search_results(query: &str) -> String {
    format!("No products match \"{query}\". Try another word, e.g. search wig")
}

pub fn product_row_description(product: &Product) -> String {
    let price = Currency::NGN.format(product.unit_price);
    match product.stock {
        Some(stock) => format!("{price} · {stock} in stock"),
        None => price,
    }
}

pub fn catalog_list_body(shown: usize, total: u64) -> String {
    if (shown as u64) < total {
        format!("Showing {shown} of {total} products. Send *search <name>* to narrow down.")
    } else {
        "Pick a product to add to the cart.".to_string()
    }
}

pub fn product_unavailable() -> String {
    "That product is no longer available. Send *catalog* to see the current list.".to_string()
}

pub fn out_of_stock(name: &str) -> String {
    format!("{name} is out of stock. Send *catalog* to pick something else.")
}

pub fn ask_quantity(product: &Product) -> String {
    let stock = product
        .stock
        .map(|s| format!(" ({s} available)"))
        .unwrap_or_default();
    format!(
        "How many {} at {}{}? Reply with a number, e.g. 2",
        product.name,
        Currency::NGN.format(product.unit_price),
        stock
    )
}

pub fn invalid_quantity(name: &str) -> String {
    format!("Please reply with a whole number of {name} greater than zero, e.g. 2")
}

pub fn exceeds_stock(name: &str, available: i64) -> String {
    format!("Only {available} {name} left in stock. Reply with a smaller number, e.g. {}", available.max(1))
}

pub fn item_added(name: &str, quantity: u32) -> String {
    format!("Added {quantity} x {name}.")
}

pub fn cart_empty() -> String {
    "Your cart is empty. Pick a product first.".to_string()
}

pub fn ask_customer() -> String {
    "Who is this invoice for? Reply with the customer's name and phone, e.g. Joy 08012345678".to_string()
}

pub fn customer_name_needed() -> String {
    "I need at least the customer's name. Reply like: Joy 08012345678".to_string()
}

pub fn cart_cleared() -> String {
    "Cart cleared. Send *catalog* to start again.".to_string()
}

pub fn no_active_cart() -> String {
    "That cart has expired. Send *catalog* to start a new one.".to_string()
}

// Invoices and delivery

pub fn invoice_created(invoice: &Invoice, customer_notified: Option<bool>) -> String {
    let mut out = format!(
        "✅ Invoice {} created for {}: {}.",
        invoice.id,
        invoice.customer_name,
        invoice.currency.format(invoice.amount)
    );
    match customer_notified {
        Some(true) => out.push_str(" Sent to the customer on WhatsApp."),
        Some(false) => out.push_str(" I couldn't reach the customer on WhatsApp; please share it yourself."),
        None => out.push_str(" No customer phone was given, so share it yourself."),
    }
    if let Some(url) = &invoice.document_url {
        out.push_str(&format!("\n{url}"));
    }
    out
}

pub fn payment_details(invoice: &Invoice, business: &str, payout: Option<&PayoutDetails>) -> String {
    let mut out = format!(
        "Hello {}, {} has sent you invoice {} for {}.",
        invoice.customer_name,
        business,
        invoice.id,
        invoice.currency.format(invoice.amount)
    );
    if let Some(p) = payout {
        out.push_str(&format!(
            "\nPay to: {} {} ({})",
            p.bank_name, p.account_number, p.account_name
        ));
    }
    if let Some(link) = &invoice.payment_link {
        out.push_str(&format!("\nOr pay online: {link}"));
    }
    out.push_str("\nReply *paid* once you have paid.");
    out
}

pub fn payout_line(payout: Option<&PayoutDetails>) -> String {
    match payout {
        Some(p) => format!("{} {} ({})", p.bank_name, p.account_number, p.account_name),
        None => "-".to_string(),
    }
}

pub fn document_caption(invoice: &Invoice) -> String {
    format!("Invoice {}", invoice.id)
}

pub fn delivery_ack(invoice: &Invoice) -> String {
    format!("Thanks for your reply! Here is invoice {} for {}.", invoice.id, invoice.currency.format(invoice.amount))
}

pub fn cross_sell() -> String {
    "\nTip: you can send invoices like this one from your own number too. Send *help* to see how.".to_string()
}

pub fn payment_noted(invoice: &Invoice) -> String {
    format!(
        "Thank you! We've told the business you paid invoice {}. They will confirm shortly.",
        invoice.id
    )
}

pub fn payment_reported_to_business(invoice: &Invoice) -> String {
    format!(
        "💰 {} says they paid invoice {} ({}). Please check your account and confirm.",
        invoice.customer_name,
        invoice.id,
        invoice.currency.format(invoice.amount)
    )
}
